//! Parsing and range checking of raw search parameters.
//!
//! Every recognised field is validated independently and all failures are collected, so a
//! caller gets the complete list of problems in a single response. Unknown keys are ignored.

use crate::{Nutrient, QuerySettings};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Raw request parameters, key to string value.
pub type RawParams = BTreeMap<String, String>;

/// Field name to every message reported for it.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors {
    pub errors: FieldErrors,
}

impl ValidationErrors {
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.errors.keys().map(String::as_str)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Vec<&str> = self.fields().collect();
        write!(f, "invalid parameters: {}", fields.join(", "))
    }
}

impl std::error::Error for ValidationErrors {}

/// Inclusive-exclusive bounds are applied by the compiler; the validator only records them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NumericRange {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl NumericRange {
    pub fn is_unbounded(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }
}

/// Typed, validated search criteria.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterSet {
    #[serde(default)]
    pub nutrients: BTreeMap<Nutrient, NumericRange>,
    #[serde(default)]
    pub max_time: Option<f64>,
    #[serde(default)]
    pub difficulty: Option<i64>,
    #[serde(default)]
    pub vegan: Option<bool>,
    #[serde(default)]
    pub vegetarian: Option<bool>,
    #[serde(default)]
    pub meal_type: Option<String>,
    #[serde(default)]
    pub ingredients: Vec<String>,
}

impl FilterSet {
    pub fn nutrient_range(&self, nutrient: Nutrient) -> NumericRange {
        self.nutrients.get(&nutrient).copied().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

impl PageRequest {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self { page, per_page }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedQuery {
    pub filters: FilterSet,
    pub page: PageRequest,
}

/// Accepted spellings of the lower and upper bound of a range field: legacy first.
const LOWER_SUFFIXES: [&str; 2] = ["bigger", "min"];
const UPPER_SUFFIXES: [&str; 2] = ["smaller", "max"];

#[derive(Debug, Clone)]
pub struct FilterValidator {
    settings: QuerySettings,
}

impl FilterValidator {
    pub fn new(settings: QuerySettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &QuerySettings {
        &self.settings
    }

    pub fn validate(&self, raw: &RawParams) -> Result<ValidatedQuery, ValidationErrors> {
        let mut errors = FieldErrors::new();
        let mut filters = FilterSet::default();

        for nutrient in Nutrient::ALL {
            let mut range = NumericRange::default();
            if let Some((key, value)) = first_present(raw, nutrient, &LOWER_SUFFIXES) {
                match validate_positive_number(value, &key, false) {
                    Ok(v) => range.min = v,
                    Err(e) => push_error(&mut errors, key, e),
                }
            }
            if let Some((key, value)) = first_present(raw, nutrient, &UPPER_SUFFIXES) {
                match validate_positive_number(value, &key, false) {
                    Ok(v) => range.max = v,
                    Err(e) => push_error(&mut errors, key, e),
                }
            }
            if !range.is_unbounded() {
                filters.nutrients.insert(nutrient, range);
            }
        }

        if let Some(value) = raw.get("time") {
            match validate_positive_number(value, "time", false) {
                Ok(v) => filters.max_time = v,
                Err(e) => push_error(&mut errors, "time", e),
            }
        }

        if let Some(value) = raw.get("difficulty") {
            match validate_integer(
                value,
                "difficulty",
                Some(self.settings.min_difficulty),
                Some(self.settings.max_difficulty),
            ) {
                Ok(v) => filters.difficulty = v,
                Err(e) => push_error(&mut errors, "difficulty", e),
            }
        }

        for field in ["vegan", "vegetarian"] {
            if let Some(value) = raw.get(field) {
                match validate_boolean(value, field) {
                    Ok(v) if field == "vegan" => filters.vegan = v,
                    Ok(v) => filters.vegetarian = v,
                    Err(e) => push_error(&mut errors, field, e),
                }
            }
        }

        if let Some(value) = raw.get("meal_type") {
            match validate_meal_type(value, &self.settings.valid_meal_types) {
                Ok(v) => filters.meal_type = v,
                Err(e) => push_error(&mut errors, "meal_type", e),
            }
        }

        if let Some(value) = raw.get("ingredients") {
            match parse_ingredients(value) {
                Ok(v) if v.len() > self.settings.max_ingredient_terms => push_error(
                    &mut errors,
                    "ingredients",
                    format!(
                        "ingredients must list at most {} terms",
                        self.settings.max_ingredient_terms
                    ),
                ),
                Ok(v) => filters.ingredients = v,
                Err(e) => push_error(&mut errors, "ingredients", e),
            }
        }

        let mut page = PageRequest::new(1, self.settings.default_page_size);
        if let Some(value) = raw.get("page") {
            match validate_integer(value, "page", Some(1), Some(u32::MAX as i64)) {
                Ok(Some(v)) => page.page = v as u32,
                Ok(None) => {}
                Err(e) => push_error(&mut errors, "page", e),
            }
        }
        if let Some(value) = raw.get("per_page") {
            match validate_integer(
                value,
                "per_page",
                Some(1),
                Some(self.settings.max_page_size as i64),
            ) {
                Ok(Some(v)) => page.per_page = v as u32,
                Ok(None) => {}
                Err(e) => push_error(&mut errors, "per_page", e),
            }
        }

        if !errors.is_empty() {
            return Err(ValidationErrors { errors });
        }
        Ok(ValidatedQuery { filters, page })
    }
}

fn push_error(errors: &mut FieldErrors, field: impl Into<String>, message: String) {
    errors.entry(field.into()).or_default().push(message);
}

/// First non-empty spelling of `<nutrient>_<suffix>` among `suffixes`.
fn first_present<'a>(
    raw: &'a RawParams,
    nutrient: Nutrient,
    suffixes: &[&str],
) -> Option<(String, &'a str)> {
    suffixes.iter().find_map(|suffix| {
        let key = format!("{}_{}", nutrient.param(), suffix);
        match raw.get(&key) {
            Some(value) if !value.trim().is_empty() => Some((key, value.as_str())),
            _ => None,
        }
    })
}

/// Non-negative finite number; zero is rejected unless `allow_zero`. Empty means absent.
pub fn validate_positive_number(
    value: &str,
    field: &str,
    allow_zero: bool,
) -> Result<Option<f64>, String> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    let num: f64 = match value.parse::<f64>() {
        Ok(n) if n.is_finite() => n,
        _ => return Err(format!("{} must be a valid number", field)),
    };
    if num < 0.0 {
        return Err(format!("{} must be non-negative", field));
    }
    if !allow_zero && num == 0.0 {
        return Err(format!("{} must be greater than zero", field));
    }
    Ok(Some(num))
}

pub fn validate_integer(
    value: &str,
    field: &str,
    min: Option<i64>,
    max: Option<i64>,
) -> Result<Option<i64>, String> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    let num: i64 = value
        .parse()
        .map_err(|_| format!("{} must be a valid integer", field))?;
    if let Some(min) = min {
        if num < min {
            return Err(format!("{} must be at least {}", field, min));
        }
    }
    if let Some(max) = max {
        if num > max {
            return Err(format!("{} must be at most {}", field, max));
        }
    }
    Ok(Some(num))
}

pub fn validate_boolean(value: &str, field: &str) -> Result<Option<bool>, String> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(Some(true)),
        "false" | "0" | "no" | "off" => Ok(Some(false)),
        _ => Err(format!("{} must be a boolean value (true/false)", field)),
    }
}

pub fn validate_meal_type(value: &str, allowed: &[String]) -> Result<Option<String>, String> {
    if value.is_empty() {
        return Ok(None);
    }
    if allowed.iter().any(|m| m == value) {
        Ok(Some(value.to_string()))
    } else {
        Err(format!("meal_type must be one of: {}", allowed.join(", ")))
    }
}

/// JSON array of strings, or a comma separated list. Entries are trimmed, empty entries
/// dropped, order and duplicates kept.
pub fn parse_ingredients(value: &str) -> Result<Vec<String>, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    if trimmed.starts_with('[') {
        let parsed: serde_json::Value = serde_json::from_str(trimmed)
            .map_err(|e| format!("Invalid JSON format for ingredients: {}", e))?;
        let items = parsed
            .as_array()
            .ok_or_else(|| "ingredients must be a list".to_string())?;
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            let s = item
                .as_str()
                .ok_or_else(|| "all ingredients must be strings".to_string())?;
            let s = s.trim();
            if !s.is_empty() {
                out.push(s.to_string());
            }
        }
        return Ok(out);
    }

    Ok(trimmed
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> RawParams {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn validator() -> FilterValidator {
        FilterValidator::new(QuerySettings::default())
    }

    #[test]
    fn empty_params_yield_defaults() {
        let q = validator().validate(&RawParams::new()).unwrap();
        assert_eq!(q.filters, FilterSet::default());
        assert_eq!(q.page, PageRequest::new(1, 20));
    }

    #[test]
    fn collects_every_failing_field() {
        let err = validator()
            .validate(&params(&[("difficulty", "9"), ("time", "-5")]))
            .unwrap_err();
        assert_eq!(err.errors.len(), 2);
        assert_eq!(err.errors["difficulty"], vec!["difficulty must be at most 3"]);
        assert_eq!(err.errors["time"], vec!["time must be non-negative"]);
    }

    #[test]
    fn legacy_and_current_range_names_resolve_to_same_bound() {
        let legacy = validator()
            .validate(&params(&[("protein_bigger", "20"), ("protein_smaller", "40")]))
            .unwrap();
        let current = validator()
            .validate(&params(&[("protein_min", "20"), ("protein_max", "40")]))
            .unwrap();
        assert_eq!(legacy.filters, current.filters);
        assert_eq!(
            current.filters.nutrient_range(Nutrient::Protein),
            NumericRange {
                min: Some(20.0),
                max: Some(40.0)
            }
        );
    }

    #[test]
    fn range_error_reported_under_supplied_key() {
        let err = validator()
            .validate(&params(&[("fat_max", "abc"), ("calories_bigger", "0")]))
            .unwrap_err();
        assert_eq!(err.errors["fat_max"], vec!["fat_max must be a valid number"]);
        assert_eq!(
            err.errors["calories_bigger"],
            vec!["calories_bigger must be greater than zero"]
        );
    }

    #[test]
    fn zero_allowed_only_when_requested() {
        assert!(validate_positive_number("0", "x", false).is_err());
        assert_eq!(validate_positive_number("0", "x", true).unwrap(), Some(0.0));
        assert!(validate_positive_number("NaN", "x", true).is_err());
        assert!(validate_positive_number("inf", "x", true).is_err());
    }

    #[test]
    fn booleans_accept_common_spellings() {
        for truthy in ["true", "TRUE", "1", "Yes", "on"] {
            assert_eq!(validate_boolean(truthy, "vegan").unwrap(), Some(true));
        }
        for falsy in ["false", "0", "NO", "Off"] {
            assert_eq!(validate_boolean(falsy, "vegan").unwrap(), Some(false));
        }
        assert!(validate_boolean("maybe", "vegan").is_err());
    }

    #[test]
    fn meal_type_error_lists_allowed_values() {
        let err = validator()
            .validate(&params(&[("meal_type", "Brunch")]))
            .unwrap_err();
        assert_eq!(
            err.errors["meal_type"],
            vec!["meal_type must be one of: Breakfast, Lunch, Dinner"]
        );
    }

    #[test]
    fn ingredients_parse_from_json_and_csv() {
        assert_eq!(
            parse_ingredients(r#"["egg", " flour ", ""]"#).unwrap(),
            vec!["egg", "flour"]
        );
        assert_eq!(
            parse_ingredients("egg, flour,,egg").unwrap(),
            vec!["egg", "flour", "egg"]
        );
        assert_eq!(
            parse_ingredients(r#"[1, 2]"#).unwrap_err(),
            "all ingredients must be strings"
        );
        assert!(parse_ingredients("[egg")
            .unwrap_err()
            .starts_with("Invalid JSON format for ingredients"));
    }

    #[test]
    fn ingredient_term_count_is_capped() {
        let terms = vec!["salt"; 11].join(",");
        let err = validator()
            .validate(&params(&[("ingredients", terms.as_str())]))
            .unwrap_err();
        assert_eq!(
            err.errors["ingredients"],
            vec!["ingredients must list at most 10 terms"]
        );

        let terms = vec!["salt"; 10].join(",");
        let q = validator()
            .validate(&params(&[("ingredients", terms.as_str())]))
            .unwrap();
        assert_eq!(q.filters.ingredients.len(), 10);
    }

    #[test]
    fn pagination_bounds() {
        let err = validator()
            .validate(&params(&[("page", "0"), ("per_page", "101")]))
            .unwrap_err();
        assert_eq!(err.errors["page"], vec!["page must be at least 1"]);
        assert_eq!(err.errors["per_page"], vec!["per_page must be at most 100"]);

        let q = validator()
            .validate(&params(&[("page", "3"), ("per_page", "10")]))
            .unwrap();
        assert_eq!(q.page, PageRequest::new(3, 10));
    }

    #[test]
    fn unknown_keys_and_empty_values_are_ignored() {
        let q = validator()
            .validate(&params(&[("sort", "name"), ("vegan", ""), ("time", "")]))
            .unwrap();
        assert_eq!(q.filters, FilterSet::default());
    }

    #[test]
    fn filter_set_survives_json_transport() {
        let q = validator()
            .validate(&params(&[
                ("vegan", "true"),
                ("calories_max", "600"),
                ("ingredients", "egg,flour"),
            ]))
            .unwrap();
        let json = serde_json::to_string(&q).unwrap();
        let back: ValidatedQuery = serde_json::from_str(&json).unwrap();
        assert_eq!(back, q);
    }
}
