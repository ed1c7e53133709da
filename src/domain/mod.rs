pub mod comparison;
pub mod comparison_schedule;
pub mod comparison_scheduler;
pub mod comparison_service;
pub mod drift;
pub mod error;
pub mod schedule_store;
pub mod scheduler;
pub mod task;
pub mod task_store;
