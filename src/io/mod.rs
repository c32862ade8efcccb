pub mod csv;

pub use self::csv::{load_observations, save_autocorrelation_csv, save_chains_csv};
