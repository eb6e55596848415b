// Application layer - Use cases over the metrics repository
pub mod chart_service;
pub mod metrics_repository;
pub mod streaming_service;
pub mod topology_service;
