// crates/analyst-verticals/src/lib.rs
// ============================================================================
// Module: Analyst Verticals Library
// Description: Built-in data verticals for the refresh engine.
// Purpose: Provide the pharmacy and auction plugins and their registration.
// Dependencies: analyst-runtime, analyst-store-sqlite
// ============================================================================

//! ## Overview
//! Each vertical owns a staging snapshot, quality rules, and a static
//! partition layout. [`register_all`] is the only way the built-in verticals
//! enter a [`PluginRegistry`]; nothing registers itself.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod auctions;
mod columns;
pub mod pharma;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use analyst_runtime::PluginRegistry;
use analyst_runtime::RegistryError;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use auctions::AuctionListing;
pub use auctions::AuctionsPlugin;
pub use auctions::ListingRecord;
pub use auctions::PropertyKind;
pub use auctions::stage_listings;
pub use pharma::PharmaPlugin;
pub use pharma::PharmacyRecord;
pub use pharma::stage_pharmacies;

// ============================================================================
// SECTION: Registration
// ============================================================================

/// Registers every built-in vertical.
///
/// # Errors
///
/// Returns [`RegistryError`] when a vertical is already registered.
pub fn register_all(registry: &mut PluginRegistry) -> Result<(), RegistryError> {
    registry.register(Arc::new(PharmaPlugin))?;
    registry.register(Arc::new(AuctionsPlugin))?;
    Ok(())
}
