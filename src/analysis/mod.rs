pub mod charts;
pub mod export;
