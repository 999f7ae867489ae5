mod aggregation;
mod common;
mod lifecycle;
