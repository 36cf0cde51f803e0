//! Bulk loading of scraped recipe documents into a [`KnowledgeGraph`].

use crate::graph::{GraphError, GraphResult, KnowledgeGraph, KnowledgeGraphBuilder};
use feinschmecker_core::{KnowledgeStore, NodeId, NodeLabel, Nutrient, Property, Relation};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

const MAIN_SOURCE_NAME: &str = "BBC GoodFood";
const MAIN_SOURCE_WEBSITE: &str = "https://bbcgoodfood.com";
const MEAL_TYPES: [&str; 3] = ["Dinner", "Lunch", "Breakfast"];

/// One scraped recipe as it appears in the source JSON array.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeDocument {
    pub title: String,
    #[serde(default)]
    pub instructions: Vec<String>,
    pub ingredients: Vec<IngredientLine>,
    pub author: String,
    pub time: i64,
    #[serde(rename = "meal type", default)]
    pub meal_type: Option<String>,
    pub vegan: bool,
    pub vegetarian: bool,
    pub nutrients: NutrientFacts,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngredientLine {
    /// Full display line, e.g. `2 eggs`.
    pub id: String,
    pub ingredient: String,
    #[serde(default)]
    pub amount: Option<serde_json::Value>,
    #[serde(default)]
    pub unit: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NutrientFacts {
    pub kcal: f64,
    pub protein: f64,
    pub fat: f64,
    pub carbs: f64,
}

impl NutrientFacts {
    pub fn get(&self, nutrient: Nutrient) -> f64 {
        match nutrient {
            Nutrient::Calories => self.kcal,
            Nutrient::Protein => self.protein,
            Nutrient::Fat => self.fat,
            Nutrient::Carbohydrates => self.carbs,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub recipes: usize,
    pub skipped_duplicates: usize,
    pub nodes: usize,
    pub edges: usize,
}

/// Lower-cases a display name and replaces characters that are awkward in identities.
pub fn slugify(name: &str) -> String {
    name.to_lowercase()
        .replace(' ', "_")
        .replace('%', "percent")
        .replace('&', "and")
}

/// Difficulty level 1..=3 derived from ingredient count and preparation time.
pub fn difficulty_level(ingredient_count: usize, time: i64) -> i64 {
    let score = ingredient_count as i64 * 3 + time;
    if score < 20 {
        1
    } else if score < 60 {
        2
    } else {
        3
    }
}

/// Accumulates recipe documents into a graph. Fixed vocabulary nodes (meal types,
/// difficulties and the main source) are created up front.
pub struct RecipeGraphLoader {
    builder: KnowledgeGraphBuilder,
    meal_types: Vec<(String, NodeId)>,
    difficulties: [NodeId; 3],
    source: NodeId,
    stats: LoadStats,
}

impl RecipeGraphLoader {
    pub fn new() -> GraphResult<Self> {
        let mut builder = KnowledgeGraph::builder();

        let mut meal_types = Vec::with_capacity(MEAL_TYPES.len());
        for name in MEAL_TYPES {
            let id = builder.insert_unique(NodeLabel::MealType, &slugify(name))?;
            builder.set_property(id, Property::MealTypeName, name)?;
            meal_types.push((name.to_string(), id));
        }

        let mut difficulties = [NodeId(0); 3];
        for (i, slot) in difficulties.iter_mut().enumerate() {
            let level = i as i64 + 1;
            let id = builder.insert_unique(NodeLabel::Difficulty, &format!("difficulty_{}", level))?;
            builder.set_property(id, Property::NumericDifficulty, level)?;
            *slot = id;
        }

        let source = builder.insert_unique(NodeLabel::Source, &slugify(MAIN_SOURCE_NAME))?;
        builder.set_property(source, Property::SourceName, MAIN_SOURCE_NAME)?;
        builder.set_property(source, Property::Website, MAIN_SOURCE_WEBSITE)?;

        Ok(Self {
            builder,
            meal_types,
            difficulties,
            source,
            stats: LoadStats::default(),
        })
    }

    /// Adds one document. Returns `false` when a recipe with the same identity was
    /// already loaded and the document was skipped.
    pub fn add(&mut self, doc: &RecipeDocument) -> GraphResult<bool> {
        let slug = slugify(&doc.title);
        if self.builder.contains(NodeLabel::Recipe, &slug) {
            debug!("Skipping duplicate recipe '{}'", doc.title);
            self.stats.skipped_duplicates += 1;
            return Ok(false);
        }
        if doc.ingredients.is_empty() {
            return Err(invalid(doc, "recipe has no ingredients"));
        }
        let meal_type = self.resolve_meal_type(doc)?;

        let b = &mut self.builder;
        let recipe = b.insert_unique(NodeLabel::Recipe, &slug)?;
        b.set_property(recipe, Property::RecipeName, doc.title.as_str())?;
        b.set_property(recipe, Property::Instructions, doc.instructions.join("\n"))?;
        b.set_property(recipe, Property::IsVegan, doc.vegan)?;
        b.set_property(recipe, Property::IsVegetarian, doc.vegetarian)?;
        if let Some(link) = doc.source.as_deref() {
            b.set_property(recipe, Property::Link, link)?;
        }
        if let Some(link) = doc.image.as_deref() {
            b.set_property(recipe, Property::ImageLink, link)?;
        }

        for line in &doc.ingredients {
            let iwa = Self::ingredient_with_amount(b, doc, line)?;
            b.relate(recipe, Relation::HasIngredient, iwa)?;
        }

        let (author, existed) = b.get_or_insert(NodeLabel::Author, &slugify(&doc.author));
        if !existed {
            b.set_property(author, Property::AuthorName, doc.author.as_str())?;
            b.relate(author, Relation::IsAuthorOf, self.source)?;
        }
        b.relate(recipe, Relation::AuthoredBy, author)?;

        let (time, existed) = b.get_or_insert(NodeLabel::Time, &format!("time_{}", doc.time));
        if !existed {
            b.set_property(time, Property::AmountOfTime, doc.time)?;
        }
        b.relate(recipe, Relation::RequiresTime, time)?;

        if let Some(meal_type) = meal_type {
            b.relate(recipe, Relation::IsMealType, meal_type)?;
        }

        let level = difficulty_level(b.degree(recipe, Relation::HasIngredient), doc.time);
        b.relate(recipe, Relation::HasDifficulty, self.difficulties[(level - 1) as usize])?;

        for nutrient in Nutrient::ALL {
            let amount = doc.nutrients.get(nutrient);
            let key = format!("{}_{:?}", nutrient.param(), amount);
            let (fact, existed) = b.get_or_insert(nutrient.label(), &key);
            if !existed {
                b.set_property(fact, nutrient.amount_property(), amount)?;
            }
            b.relate(recipe, nutrient.relation(), fact)?;
        }

        self.stats.recipes += 1;
        Ok(true)
    }

    pub fn finish(self) -> (KnowledgeGraph, LoadStats) {
        let graph = self.builder.build();
        let stats = LoadStats {
            nodes: graph.node_count(),
            edges: graph.edge_count(),
            ..self.stats
        };
        (graph, stats)
    }

    fn resolve_meal_type(&self, doc: &RecipeDocument) -> GraphResult<Option<NodeId>> {
        match doc.meal_type.as_deref() {
            None | Some("misc") => Ok(None),
            Some(name) => self
                .meal_types
                .iter()
                .find(|(known, _)| known == name)
                .map(|(_, id)| Some(*id))
                .ok_or_else(|| invalid(doc, &format!("unknown meal type '{}'", name))),
        }
    }

    fn ingredient_with_amount(
        b: &mut KnowledgeGraphBuilder,
        doc: &RecipeDocument,
        line: &IngredientLine,
    ) -> GraphResult<NodeId> {
        let first = line
            .id
            .chars()
            .next()
            .ok_or_else(|| invalid(doc, "empty ingredient line"))?;
        let key = if first.is_ascii_digit() {
            slugify(&line.id)
        } else {
            slugify(&format!("1 {}", line.id))
        };

        let (iwa, existed) = b.get_or_insert(NodeLabel::IngredientWithAmount, &key);
        if existed {
            return Ok(iwa);
        }

        b.set_property(iwa, Property::IngredientWithAmountName, line.id.as_str())?;
        b.set_property(iwa, Property::AmountOfIngredient, parse_amount(doc, line)?)?;
        if let Some(unit) = line.unit.as_deref() {
            b.set_property(iwa, Property::UnitOfIngredient, unit)?;
        }

        let (ingredient, existed) = b.get_or_insert(NodeLabel::Ingredient, &slugify(&line.ingredient));
        if !existed {
            b.set_property(ingredient, Property::IngredientName, line.ingredient.as_str())?;
        }
        b.relate(iwa, Relation::TypeOfIngredient, ingredient)?;
        Ok(iwa)
    }
}

fn parse_amount(doc: &RecipeDocument, line: &IngredientLine) -> GraphResult<f64> {
    match &line.amount {
        None | Some(serde_json::Value::Null) => Ok(1.0),
        Some(serde_json::Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| invalid(doc, &format!("amount out of range in '{}'", line.id))),
        Some(serde_json::Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| invalid(doc, &format!("non-numeric amount '{}' in '{}'", s, line.id))),
        Some(other) => Err(invalid(doc, &format!("unsupported amount {} in '{}'", other, line.id))),
    }
}

fn invalid(doc: &RecipeDocument, reason: &str) -> GraphError {
    GraphError::InvalidDocument {
        title: doc.title.clone(),
        reason: reason.to_string(),
    }
}

/// Loads every document from a JSON array. Invalid documents abort the load.
pub fn load_recipes_from_reader<R: Read>(reader: R) -> GraphResult<(KnowledgeGraph, LoadStats)> {
    let docs: Vec<RecipeDocument> = serde_json::from_reader(reader)?;
    load_documents(&docs)
}

pub fn load_recipes_from_json(path: impl AsRef<Path>) -> GraphResult<(KnowledgeGraph, LoadStats)> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)?;
    let (graph, stats) = load_recipes_from_reader(std::io::BufReader::new(file))?;
    info!(
        "Loaded {} recipes from {} ({} nodes, {} edges)",
        stats.recipes,
        path.display(),
        stats.nodes,
        stats.edges
    );
    Ok((graph, stats))
}

pub fn load_documents(docs: &[RecipeDocument]) -> GraphResult<(KnowledgeGraph, LoadStats)> {
    let mut loader = RecipeGraphLoader::new()?;
    for doc in docs {
        loader.add(doc)?;
    }
    let (graph, stats) = loader.finish();
    if stats.skipped_duplicates > 0 {
        warn!("Skipped {} duplicate recipe titles", stats.skipped_duplicates);
    }
    Ok((graph, stats))
}
