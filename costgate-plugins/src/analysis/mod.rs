pub mod query_complexity;
