pub mod graph;
pub mod handle;
pub mod loader;

pub use graph::*;
pub use handle::*;
pub use loader::{
    difficulty_level, load_documents, load_recipes_from_json, load_recipes_from_reader, slugify,
    IngredientLine, LoadStats, NutrientFacts, RecipeDocument, RecipeGraphLoader,
};
