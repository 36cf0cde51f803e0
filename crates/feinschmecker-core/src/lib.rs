pub mod config;
pub mod error;
pub mod traits;
pub mod types;
pub mod validation;

pub use config::{
    ConfigManager, LoggingConfig, QuerySettings, Settings, StoreSettings, TaskSettings,
};
pub use error::*;
pub use traits::*;
pub use types::*;
pub use validation::{
    FieldErrors, FilterSet, FilterValidator, NumericRange, PageRequest, RawParams,
    ValidatedQuery, ValidationErrors,
};
