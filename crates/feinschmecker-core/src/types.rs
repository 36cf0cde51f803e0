use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Dense index of a node inside one loaded knowledge graph. Not stable across reloads;
/// use [`GraphNode::key`] for a stable identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeLabel {
    Recipe,
    Ingredient,
    IngredientWithAmount,
    Author,
    Source,
    Time,
    MealType,
    Difficulty,
    Calories,
    Protein,
    Fat,
    Carbohydrates,
}

impl fmt::Display for NodeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeLabel::Recipe => "Recipe",
            NodeLabel::Ingredient => "Ingredient",
            NodeLabel::IngredientWithAmount => "IngredientWithAmount",
            NodeLabel::Author => "Author",
            NodeLabel::Source => "Source",
            NodeLabel::Time => "Time",
            NodeLabel::MealType => "MealType",
            NodeLabel::Difficulty => "Difficulty",
            NodeLabel::Calories => "Calories",
            NodeLabel::Protein => "Protein",
            NodeLabel::Fat => "Fat",
            NodeLabel::Carbohydrates => "Carbohydrates",
        };
        write!(f, "{}", s)
    }
}

/// Directed, named relations between nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    HasIngredient,
    TypeOfIngredient,
    AuthoredBy,
    IsAuthorOf,
    RequiresTime,
    IsMealType,
    HasDifficulty,
    HasCalories,
    HasProtein,
    HasFat,
    HasCarbohydrates,
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Relation::HasIngredient => "has_ingredient",
            Relation::TypeOfIngredient => "type_of_ingredient",
            Relation::AuthoredBy => "authored_by",
            Relation::IsAuthorOf => "is_author_of",
            Relation::RequiresTime => "requires_time",
            Relation::IsMealType => "is_meal_type",
            Relation::HasDifficulty => "has_difficulty",
            Relation::HasCalories => "has_calories",
            Relation::HasProtein => "has_protein",
            Relation::HasFat => "has_fat",
            Relation::HasCarbohydrates => "has_carbohydrates",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Relation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "has_ingredient" => Ok(Relation::HasIngredient),
            "type_of_ingredient" => Ok(Relation::TypeOfIngredient),
            "authored_by" => Ok(Relation::AuthoredBy),
            "is_author_of" => Ok(Relation::IsAuthorOf),
            "requires_time" => Ok(Relation::RequiresTime),
            "is_meal_type" => Ok(Relation::IsMealType),
            "has_difficulty" => Ok(Relation::HasDifficulty),
            "has_calories" => Ok(Relation::HasCalories),
            "has_protein" => Ok(Relation::HasProtein),
            "has_fat" => Ok(Relation::HasFat),
            "has_carbohydrates" => Ok(Relation::HasCarbohydrates),
            other => Err(format!("unknown relation: {}", other)),
        }
    }
}

/// Single-valued datatype properties attached to nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Property {
    RecipeName,
    Instructions,
    IsVegan,
    IsVegetarian,
    Link,
    ImageLink,
    IngredientWithAmountName,
    AmountOfIngredient,
    UnitOfIngredient,
    IngredientName,
    AuthorName,
    SourceName,
    Website,
    AmountOfTime,
    MealTypeName,
    NumericDifficulty,
    AmountOfCalories,
    AmountOfProtein,
    AmountOfFat,
    AmountOfCarbohydrates,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Bool(bool),
    Integer(i64),
    Number(f64),
    Text(String),
}

impl Literal {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Literal::Number(n) => Some(*n),
            Literal::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Literal::Integer(i) => Some(*i),
            Literal::Number(n) if n.fract() == 0.0 => Some(*n as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Literal::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Literal::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Bool(b) => write!(f, "{}", b),
            Literal::Integer(i) => write!(f, "{}", i),
            Literal::Number(n) => write!(f, "{}", n),
            Literal::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Literal::Text(value.to_string())
    }
}

impl From<String> for Literal {
    fn from(value: String) -> Self {
        Literal::Text(value)
    }
}

impl From<f64> for Literal {
    fn from(value: f64) -> Self {
        Literal::Number(value)
    }
}

impl From<i64> for Literal {
    fn from(value: i64) -> Self {
        Literal::Integer(value)
    }
}

impl From<bool> for Literal {
    fn from(value: bool) -> Self {
        Literal::Bool(value)
    }
}

/// A typed node of the knowledge graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: NodeId,
    pub label: NodeLabel,
    /// Stable slug identity, unique among nodes of the same label.
    pub key: String,
    pub properties: BTreeMap<Property, Literal>,
}

impl GraphNode {
    pub fn property(&self, property: Property) -> Option<&Literal> {
        self.properties.get(&property)
    }
}

/// The four nutrient facts every recipe carries, each reachable through its own relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Nutrient {
    Calories,
    Protein,
    Fat,
    Carbohydrates,
}

impl Nutrient {
    pub const ALL: [Nutrient; 4] = [
        Nutrient::Calories,
        Nutrient::Protein,
        Nutrient::Fat,
        Nutrient::Carbohydrates,
    ];

    /// Request parameter stem, e.g. `calories` in `calories_min`.
    pub fn param(&self) -> &'static str {
        match self {
            Nutrient::Calories => "calories",
            Nutrient::Protein => "protein",
            Nutrient::Fat => "fat",
            Nutrient::Carbohydrates => "carbohydrates",
        }
    }

    pub fn label(&self) -> NodeLabel {
        match self {
            Nutrient::Calories => NodeLabel::Calories,
            Nutrient::Protein => NodeLabel::Protein,
            Nutrient::Fat => NodeLabel::Fat,
            Nutrient::Carbohydrates => NodeLabel::Carbohydrates,
        }
    }

    pub fn relation(&self) -> Relation {
        match self {
            Nutrient::Calories => Relation::HasCalories,
            Nutrient::Protein => Relation::HasProtein,
            Nutrient::Fat => Relation::HasFat,
            Nutrient::Carbohydrates => Relation::HasCarbohydrates,
        }
    }

    pub fn amount_property(&self) -> Property {
        match self {
            Nutrient::Calories => Property::AmountOfCalories,
            Nutrient::Protein => Property::AmountOfProtein,
            Nutrient::Fat => Property::AmountOfFat,
            Nutrient::Carbohydrates => Property::AmountOfCarbohydrates,
        }
    }
}

impl fmt::Display for Nutrient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.param())
    }
}

/// Emitted after the knowledge store has been swapped for a freshly loaded graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadEvent {
    pub generation: u64,
    pub node_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relation_round_trips_through_display() {
        for relation in [
            Relation::HasIngredient,
            Relation::TypeOfIngredient,
            Relation::IsMealType,
            Relation::HasCarbohydrates,
        ] {
            assert_eq!(relation.to_string().parse::<Relation>().unwrap(), relation);
        }
        assert!("likes".parse::<Relation>().is_err());
    }

    #[test]
    fn literal_accessors() {
        assert_eq!(Literal::Integer(3).as_f64(), Some(3.0));
        assert_eq!(Literal::Number(2.0).as_i64(), Some(2));
        assert_eq!(Literal::Number(2.5).as_i64(), None);
        assert_eq!(Literal::from("x").as_str(), Some("x"));
        assert_eq!(Literal::Bool(true).as_f64(), None);
    }
}
