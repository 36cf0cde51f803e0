use crate::compiler::vars;
use crate::plan::{Row, Term};
use feinschmecker_core::{FeinschmeckerError, Literal, Nutrient, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Leading "Step 3", "3.", "3)" and similar numbering in an instruction line.
static STEP_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:step\s*\d+\s*[:.)\-]?\s*)?(?:\d+\s*[:.)\-]?\s*)?").unwrap()
});

/// Display-ready representation of one recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RecipeRecord {
    pub name: String,
    pub instructions: Vec<String>,
    pub ingredients: Vec<String>,
    pub vegan: bool,
    pub vegetarian: bool,
    pub meal_type: Option<String>,
    pub time: f64,
    pub difficulty: i64,
    pub calories: f64,
    pub protein: f64,
    pub fat: f64,
    pub carbohydrates: f64,
}

/// Converts one grouped row into a [`RecipeRecord`].
///
/// A missing mandatory binding means the graph violates its own data model and is reported
/// as [`FeinschmeckerError::DataIntegrity`].
pub fn shape_row(row: &Row) -> Result<RecipeRecord> {
    let ingredients = match row.get(vars::INGREDIENTS) {
        Some(Term::List(items)) => items.iter().map(|l| l.to_string()).collect(),
        _ => return Err(missing(row, vars::INGREDIENTS)),
    };
    let meal_type = match row.get(vars::MEAL_TYPE) {
        None => None,
        Some(Term::Literal(Literal::Text(s))) => Some(s.clone()),
        Some(_) => return Err(missing(row, vars::MEAL_TYPE)),
    };

    Ok(RecipeRecord {
        name: text(row, vars::NAME)?.to_string(),
        instructions: split_instructions(text(row, vars::INSTRUCTIONS)?),
        ingredients,
        vegan: flag(row, vars::VEGAN)?,
        vegetarian: flag(row, vars::VEGETARIAN)?,
        meal_type,
        time: number(row, vars::TIME)?,
        difficulty: literal(row, vars::DIFFICULTY)?
            .as_i64()
            .ok_or_else(|| missing(row, vars::DIFFICULTY))?,
        calories: number(row, Nutrient::Calories.param())?,
        protein: number(row, Nutrient::Protein.param())?,
        fat: number(row, Nutrient::Fat.param())?,
        carbohydrates: number(row, Nutrient::Carbohydrates.param())?,
    })
}

pub fn shape_rows(rows: &[Row]) -> Result<Vec<RecipeRecord>> {
    rows.iter().map(shape_row).collect()
}

/// Splits stored instruction text into steps.
///
/// Accepts both a list literal (`['Step 1 Heat oven.', 'Step 2 Bake.']`) and plain
/// newline-separated text. Numbering prefixes are removed and empty steps dropped.
pub fn split_instructions(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    let steps = if trimmed.starts_with('[') && trimmed.ends_with(']') {
        parse_list_literal(&trimmed[1..trimmed.len() - 1])
    } else {
        trimmed.lines().map(str::to_string).collect()
    };
    steps
        .iter()
        .map(|s| STEP_PREFIX.replace(s, "").trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_list_literal(body: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\'' && c != '"' {
            continue;
        }
        let quote = c;
        let mut item = String::new();
        while let Some(c) = chars.next() {
            match c {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        item.push(match escaped {
                            'n' => '\n',
                            't' => '\t',
                            other => other,
                        });
                    }
                }
                c if c == quote => break,
                c => item.push(c),
            }
        }
        items.push(item);
    }
    items
}

fn missing(row: &Row, field: &str) -> FeinschmeckerError {
    let recipe = row
        .get(vars::RECIPE)
        .and_then(Term::as_node)
        .map(|id| id.to_string())
        .unwrap_or_else(|| "?".to_string());
    FeinschmeckerError::DataIntegrity(format!(
        "recipe {} has no usable '{}' value",
        recipe, field
    ))
}

fn literal<'r>(row: &'r Row, field: &str) -> Result<&'r Literal> {
    row.get(field)
        .and_then(Term::as_literal)
        .ok_or_else(|| missing(row, field))
}

fn text<'r>(row: &'r Row, field: &str) -> Result<&'r str> {
    literal(row, field)?
        .as_str()
        .ok_or_else(|| missing(row, field))
}

fn flag(row: &Row, field: &str) -> Result<bool> {
    literal(row, field)?
        .as_bool()
        .ok_or_else(|| missing(row, field))
}

fn number(row: &Row, field: &str) -> Result<f64> {
    literal(row, field)?
        .as_f64()
        .ok_or_else(|| missing(row, field))
}
