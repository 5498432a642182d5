pub mod association;
pub mod attention;
pub mod budget;
pub mod consolidator;
pub mod effector;
pub mod reflexes;
pub mod router;

pub use attention::AttentionScheduler;
pub use budget::BudgetTracker;
pub use consolidator::Consolidator;
pub use effector::Effector;
pub use reflexes::ReflexChain;
pub use router::Router;
