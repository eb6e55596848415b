// Domain layer - pure transforms over measurements and topology snapshots
pub mod chart;
pub mod interval;
pub mod liveness;
pub mod measurement;
pub mod series;
pub mod topology;
