// crates/analyst-verticals/src/auctions.rs
// ============================================================================
// Module: Auction Listings Vertical
// Description: Enriches staged auction listings and publishes them.
// Purpose: Serve open auctions with property kind and discount metrics.
// Dependencies: analyst-core, analyst-runtime, analyst-store-sqlite, rusqlite
// ============================================================================

//! ## Overview
//! Each run reads the staged listing snapshot, derives the property kind from
//! the title and the discount against the appraisal, gates the enriched batch
//! on field completeness and non-negative amounts, and republishes it.
//! Listings that are `open` or `upcoming` are current; every other status is
//! historical.
//!
//! Kind inference is keyword based and checks dwelling, then commercial, then
//! parking keywords; a title matching none is `other`. Keywords match whole
//! words (singular or plural), so `localidad` is not a `local`.
//!
//! Every published listing also gets a row in `auctions_listing_summaries`
//! with a one-line digest and a completeness verdict, written in the same
//! transaction as the partitions.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use analyst_core::NaturalKey;
use analyst_core::QualityRules;
use analyst_core::RecordRejection;
use analyst_runtime::PluginContext;
use analyst_runtime::PluginError;
use analyst_runtime::PluginOutcome;
use analyst_runtime::VerticalPlugin;
use analyst_store_sqlite::ColumnType;
use analyst_store_sqlite::PartitionColumn;
use analyst_store_sqlite::PartitionLayout;
use analyst_store_sqlite::PartitionMaterializer;
use analyst_store_sqlite::PartitionRecord;
use analyst_store_sqlite::QualityGate;
use analyst_store_sqlite::SqlValue;
use analyst_store_sqlite::StoreError;
use analyst_store_sqlite::StoreSession;
use analyst_store_sqlite::SummaryLayout;
use rusqlite::params;
use serde::Deserialize;
use serde::Serialize;

use crate::columns::db_error;
use crate::columns::flag;
use crate::columns::is_blank;
use crate::columns::real;
use crate::columns::text;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Plugin name.
pub const AUCTIONS_PLUGIN_NAME: &str = "auctions";
/// Plugin version.
pub const AUCTIONS_PLUGIN_VERSION: &str = "2.0.0";
/// Metadata namespace.
pub const AUCTIONS_META_NAMESPACE: &str = "auctions_meta";
/// Staged snapshot table.
pub const AUCTIONS_STAGING_TABLE: &str = "auctions_staging_listings";
/// Statuses routed to the current partition.
const CURRENT_STATUSES: [&str; 2] = ["open", "upcoming"];
/// Title keywords marking a dwelling.
const DWELLING_KEYWORDS: &[&str] = &["vivienda", "piso", "casa", "dwelling", "house", "apartment"];
/// Title keywords marking commercial premises.
const COMMERCIAL_KEYWORDS: &[&str] = &["local", "oficina", "commercial", "office", "shop"];
/// Title keywords marking a parking space.
const PARKING_KEYWORDS: &[&str] = &["garaje", "aparcamiento", "garage", "parking"];
/// Suffixes accepted after a keyword.
const PLURAL_SUFFIXES: [&str; 3] = ["", "s", "es"];
/// Verdict for a listing with every summary field present.
const COMPLETE_VERDICT: &str = "Completo";
/// Placeholder for absent digest values.
const NOT_AVAILABLE: &str = "n/d";

/// Published columns, in [`ListingRecord::column_values`] order.
const LISTING_COLUMNS: &[PartitionColumn] = &[
    PartitionColumn::new("auction_uid", ColumnType::Text),
    PartitionColumn::new("title", ColumnType::Text),
    PartitionColumn::new("status", ColumnType::Text),
    PartitionColumn::new("starts_on", ColumnType::Text),
    PartitionColumn::new("ends_on", ColumnType::Text),
    PartitionColumn::new("kind", ColumnType::Text),
    PartitionColumn::new("is_dwelling", ColumnType::Integer),
    PartitionColumn::new("is_commercial", ColumnType::Integer),
    PartitionColumn::new("municipality", ColumnType::Text),
    PartitionColumn::new("province", ColumnType::Text),
    PartitionColumn::new("opening_price", ColumnType::Real),
    PartitionColumn::new("appraisal_value", ColumnType::Real),
    PartitionColumn::new("discount_pct", ColumnType::Real),
    PartitionColumn::new("detail_url", ColumnType::Text),
];

/// Listing partitions.
pub static LISTING_LAYOUT: PartitionLayout = PartitionLayout {
    current_table: "auctions_current_listings",
    historical_table: "auctions_historical_listings",
    key_column: "auction_id",
    columns: LISTING_COLUMNS,
};

/// Summary columns, in [`ListingRecord::summary_values`] order.
const SUMMARY_COLUMNS: &[PartitionColumn] = &[
    PartitionColumn::new("summary", ColumnType::Text),
    PartitionColumn::new("completeness", ColumnType::Text),
];

/// Per-listing digest table.
pub static LISTING_SUMMARY: SummaryLayout = SummaryLayout {
    table: "auctions_listing_summaries",
    columns: SUMMARY_COLUMNS,
};

/// Listing quality rules.
pub const LISTING_RULES: QualityRules = QualityRules {
    required_non_null: &[
        "auction_uid",
        "starts_on",
        "ends_on",
        "opening_price",
        "appraisal_value",
        "detail_url",
    ],
    non_negative: &["opening_price", "appraisal_value", "discount_pct"],
};

// ============================================================================
// SECTION: Records
// ============================================================================

/// Staged auction listing as delivered by ingestion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuctionListing {
    /// Numeric auction identifier (natural key).
    pub auction_id: Option<i64>,
    /// Public auction identifier.
    pub auction_uid: Option<String>,
    /// Listing title.
    pub title: Option<String>,
    /// Auction status (`open`, `upcoming`, `closed`, ...).
    pub status: Option<String>,
    /// Bidding start date.
    pub starts_on: Option<String>,
    /// Bidding end date.
    pub ends_on: Option<String>,
    /// Municipality.
    pub municipality: Option<String>,
    /// Province.
    pub province: Option<String>,
    /// Opening bid.
    pub opening_price: Option<f64>,
    /// Appraised value.
    pub appraisal_value: Option<f64>,
    /// Detail page URL.
    pub detail_url: Option<String>,
}

/// Property kind inferred from the listing title.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyKind {
    /// Residential property.
    Dwelling,
    /// Commercial premises or offices.
    Commercial,
    /// Parking space or garage.
    Parking,
    /// Anything else.
    Other,
}

impl PropertyKind {
    /// Every kind, in reporting order.
    pub const ALL: [Self; 4] = [Self::Dwelling, Self::Commercial, Self::Parking, Self::Other];

    /// Returns the stored label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dwelling => "dwelling",
            Self::Commercial => "commercial",
            Self::Parking => "parking",
            Self::Other => "other",
        }
    }

    /// Infers the kind from a listing title.
    #[must_use]
    pub fn infer(title: Option<&str>) -> Self {
        let Some(title) = title else {
            return Self::Other;
        };
        let title = title.to_lowercase();
        let words: Vec<&str> =
            title.split(|c: char| !c.is_alphanumeric()).filter(|word| !word.is_empty()).collect();
        let matches = |keywords: &[&str]| {
            words.iter().any(|word| keywords.iter().any(|keyword| is_keyword_form(word, keyword)))
        };
        if matches(DWELLING_KEYWORDS) {
            Self::Dwelling
        } else if matches(COMMERCIAL_KEYWORDS) {
            Self::Commercial
        } else if matches(PARKING_KEYWORDS) {
            Self::Parking
        } else {
            Self::Other
        }
    }
}

/// Returns true when `word` is `keyword` or one of its plural forms.
fn is_keyword_form(word: &str, keyword: &str) -> bool {
    word.strip_prefix(keyword).is_some_and(|rest| PLURAL_SUFFIXES.contains(&rest))
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Enriched listing published by the vertical.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListingRecord {
    /// Staged fields.
    #[serde(flatten)]
    pub listing: AuctionListing,
    /// Inferred property kind.
    pub kind: PropertyKind,
    /// True for dwellings.
    pub is_dwelling: bool,
    /// True for commercial premises.
    pub is_commercial: bool,
    /// Discount of the opening bid against the appraisal, in percent.
    pub discount_pct: Option<f64>,
}

impl ListingRecord {
    /// Derives kind, flags, and discount for a staged listing.
    #[must_use]
    pub fn enrich(listing: AuctionListing) -> Self {
        let kind = PropertyKind::infer(listing.title.as_deref());
        let discount_pct = discount_pct(listing.opening_price, listing.appraisal_value);
        Self {
            listing,
            kind,
            is_dwelling: kind == PropertyKind::Dwelling,
            is_commercial: kind == PropertyKind::Commercial,
            discount_pct,
        }
    }

    /// Returns true when the listing belongs in the current partition.
    #[must_use]
    pub fn is_current(&self) -> bool {
        self.listing.status.as_deref().is_some_and(|status| {
            let status = status.trim();
            CURRENT_STATUSES.iter().any(|current| status.eq_ignore_ascii_case(current))
        })
    }

    /// Returns `Completo`, or `Faltan: ` followed by the missing fields.
    ///
    /// A blank title counts as a missing description; a zero amount counts
    /// as missing.
    #[must_use]
    pub fn completeness(&self) -> String {
        let listing = &self.listing;
        let missing: Vec<&str> = [
            ("Descripción", is_blank(listing.title.as_deref())),
            ("Tasación", !is_positive(listing.appraisal_value)),
            ("Valor subasta", !is_positive(listing.opening_price)),
        ]
        .into_iter()
        .filter_map(|(label, absent)| absent.then_some(label))
        .collect();
        if missing.is_empty() {
            COMPLETE_VERDICT.to_string()
        } else {
            format!("Faltan: {}", missing.join(", "))
        }
    }

    /// Returns the one-line digest stored in the summary table.
    #[must_use]
    pub fn summary(&self) -> String {
        let listing = &self.listing;
        let amount = |value: Option<f64>| value.map_or_else(|| NOT_AVAILABLE.to_string(), |v| v.to_string());
        let discount = self
            .discount_pct
            .map_or_else(|| NOT_AVAILABLE.to_string(), |value| format!("{value:.1}%"));
        format!(
            "Estado: {} · Tipo: {} · Precio: {} · Tasación: {} · Descuento: {discount}",
            listing.status.as_deref().filter(|status| !status.trim().is_empty()).unwrap_or(NOT_AVAILABLE),
            self.kind,
            amount(listing.opening_price),
            amount(listing.appraisal_value),
        )
    }
}

/// Returns true for a present, strictly positive amount.
fn is_positive(value: Option<f64>) -> bool {
    value.is_some_and(|amount| amount > 0.0)
}

impl PartitionRecord for ListingRecord {
    fn identity(&self) -> Result<NaturalKey, RecordRejection> {
        self.listing
            .auction_id
            .map(NaturalKey::new)
            .ok_or_else(|| RecordRejection::missing_key_fields(None))
    }

    fn column_values(&self) -> Vec<SqlValue> {
        let listing = &self.listing;
        vec![
            text(listing.auction_uid.as_deref()),
            text(listing.title.as_deref()),
            text(listing.status.as_deref()),
            text(listing.starts_on.as_deref()),
            text(listing.ends_on.as_deref()),
            text(Some(self.kind.as_str())),
            flag(self.is_dwelling),
            flag(self.is_commercial),
            text(listing.municipality.as_deref()),
            text(listing.province.as_deref()),
            real(listing.opening_price),
            real(listing.appraisal_value),
            real(self.discount_pct),
            text(listing.detail_url.as_deref()),
        ]
    }

    fn summary_values(&self) -> Vec<SqlValue> {
        vec![SqlValue::Text(self.summary()), SqlValue::Text(self.completeness())]
    }
}

/// Computes `100 * (1 - opening / appraisal)` for a positive appraisal.
#[must_use]
pub fn discount_pct(opening_price: Option<f64>, appraisal_value: Option<f64>) -> Option<f64> {
    let opening = opening_price.filter(|value| value.is_finite())?;
    let appraisal = appraisal_value.filter(|value| value.is_finite() && *value > 0.0)?;
    Some(100.0 * (1.0 - opening / appraisal))
}

/// Formats the per-kind breakdown recorded as run notes.
#[must_use]
pub fn kind_breakdown(records: &[ListingRecord]) -> String {
    let parts: Vec<String> = PropertyKind::ALL
        .iter()
        .map(|kind| {
            let count = records.iter().filter(|record| record.kind == *kind).count();
            format!("{kind}:{count}")
        })
        .collect();
    format!("kinds={}", parts.join(","))
}

// ============================================================================
// SECTION: Staging
// ============================================================================

/// Staging table definition.
const STAGING_DDL: &str = "CREATE TABLE IF NOT EXISTS auctions_staging_listings (auction_id \
                           INTEGER, auction_uid TEXT, title TEXT, status TEXT, starts_on TEXT, \
                           ends_on TEXT, municipality TEXT, province TEXT, opening_price REAL, \
                           appraisal_value REAL, detail_url TEXT)";

/// Replaces the staged listing snapshot with `listings`.
///
/// # Errors
///
/// Returns [`StoreError`] when the snapshot cannot be written; the previous
/// snapshot is kept in that case.
pub fn stage_listings(
    session: &StoreSession,
    listings: &[AuctionListing],
) -> Result<usize, StoreError> {
    session.with_transaction(|tx| {
        tx.execute_batch(STAGING_DDL).map_err(|err| db_error(&err))?;
        tx.execute("DELETE FROM auctions_staging_listings", []).map_err(|err| db_error(&err))?;
        let mut stmt = tx
            .prepare(
                "INSERT INTO auctions_staging_listings (auction_id, auction_uid, title, status, \
                 starts_on, ends_on, municipality, province, opening_price, appraisal_value, \
                 detail_url) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )
            .map_err(|err| db_error(&err))?;
        for listing in listings {
            stmt.execute(params![
                listing.auction_id,
                listing.auction_uid,
                listing.title,
                listing.status,
                listing.starts_on,
                listing.ends_on,
                listing.municipality,
                listing.province,
                listing.opening_price,
                listing.appraisal_value,
                listing.detail_url,
            ])
            .map_err(|err| db_error(&err))?;
        }
        Ok(listings.len())
    })
}

/// Reads the staged snapshot in staging order.
///
/// # Errors
///
/// Returns [`StoreError`] when the query fails.
pub fn load_staged_listings(session: &StoreSession) -> Result<Vec<AuctionListing>, StoreError> {
    session.with_connection(|connection| {
        connection.execute_batch(STAGING_DDL).map_err(|err| db_error(&err))?;
        let mut stmt = connection
            .prepare(
                "SELECT auction_id, auction_uid, title, status, starts_on, ends_on, municipality, \
                 province, opening_price, appraisal_value, detail_url FROM \
                 auctions_staging_listings ORDER BY rowid",
            )
            .map_err(|err| db_error(&err))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(AuctionListing {
                    auction_id: row.get(0)?,
                    auction_uid: row.get(1)?,
                    title: row.get(2)?,
                    status: row.get(3)?,
                    starts_on: row.get(4)?,
                    ends_on: row.get(5)?,
                    municipality: row.get(6)?,
                    province: row.get(7)?,
                    opening_price: row.get(8)?,
                    appraisal_value: row.get(9)?,
                    detail_url: row.get(10)?,
                })
            })
            .map_err(|err| db_error(&err))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(|err| db_error(&err))
    })
}

// ============================================================================
// SECTION: Plugin
// ============================================================================

/// Auction listings plugin.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuctionsPlugin;

impl VerticalPlugin for AuctionsPlugin {
    fn name(&self) -> &str {
        AUCTIONS_PLUGIN_NAME
    }

    fn version(&self) -> &str {
        AUCTIONS_PLUGIN_VERSION
    }

    fn meta_namespace(&self) -> &str {
        AUCTIONS_META_NAMESPACE
    }

    fn materialize(&self, context: &PluginContext<'_>) -> Result<PluginOutcome, PluginError> {
        let records: Vec<ListingRecord> =
            load_staged_listings(context.session)?.into_iter().map(ListingRecord::enrich).collect();
        QualityGate::new(Arc::clone(context.events)).evaluate(
            context.session,
            context.namespace,
            context.run_id,
            &records,
            &LISTING_RULES,
        )?;

        let kinds = kind_breakdown(&records);
        let (current, historical): (Vec<_>, Vec<_>) =
            records.into_iter().partition(ListingRecord::is_current);
        let materializer = PartitionMaterializer::new(&LISTING_LAYOUT, Arc::clone(context.events))?
            .with_summary(&LISTING_SUMMARY)?;
        let counts =
            materializer.apply(context.session, context.namespace, context.run_id, &current, &historical)?;
        Ok(PluginOutcome {
            processed: counts.processed,
            errors: counts.errors,
            notes: Some(format!("{kinds};summaries={}", counts.summarized)),
        })
    }
}
