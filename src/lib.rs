pub mod api_router;
pub mod audit;
pub mod classifier;
pub mod dashboards;
pub mod enrichment;
pub mod events;
pub mod geo;
pub mod import;
pub mod managers;
pub mod routing;
pub mod shared;
pub mod tickets;
