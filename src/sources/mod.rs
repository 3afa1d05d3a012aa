// Source cleaners - one module per raw file format
//
// Each cleaner takes a `WideTable` as read from disk and returns normalized
// records keyed by `Fips`. Unemployment runs first: its counties become the
// master list every other source is reconciled against.

pub mod unemployment;
pub mod population;
pub mod housing;

pub use unemployment::{clean_unemployment, UnemploymentOutput, UnemploymentStats};
pub use population::{clean_population, PopulationOutput};
pub use housing::{clean_housing, HousingOutput, RegionConflict};
