pub mod compiler;
pub mod engine;
pub mod executor;
pub mod pagination;
pub mod plan;
pub mod response;
pub mod shaper;

pub use compiler::{compile, compile_lookup};
pub use engine::{RecipeSearchEngine, StoreInfo};
pub use executor::PlanExecutor;
pub use pagination::{paginate, total_pages, Page, PageMeta};
pub use plan::{Comparison, Constraint, GroupBy, MatchBlock, QueryPlan, Row, Step, Term};
pub use response::{ErrorBody, ErrorCode, ErrorResponse, QueryResponse, SearchReply};
pub use shaper::{shape_row, shape_rows, split_instructions, RecipeRecord};
