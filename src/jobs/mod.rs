pub mod follow_audit;
