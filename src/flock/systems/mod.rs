pub mod avoidance;
pub mod query_batch;
pub mod steering;
pub mod update_loop;
