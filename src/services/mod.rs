//! Application services sitting between the HTTP layer and the store.

pub mod catalog;
pub mod checkout;
pub mod media;
pub mod orders;
pub mod settings;
pub mod settlement;

pub use catalog::{CatalogService, ProductInput, ProductPatch};
pub use checkout::{CheckoutRedirect, CheckoutService};
pub use media::MediaService;
pub use orders::{OrderService, OrdersOverview};
pub use settings::{SaveOutcome, SettingsService};
pub use settlement::{CardSettlement, SettlementService};
