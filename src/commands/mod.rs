pub mod import_bars;
pub mod macro_series;
pub mod optimize;
pub mod run_daily;
pub mod snapshot_file;
