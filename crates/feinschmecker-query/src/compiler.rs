use crate::plan::{Comparison, Constraint, GroupBy, MatchBlock, QueryPlan, Step};
use feinschmecker_core::{FilterSet, NodeLabel, Nutrient, Property, Relation};
use tracing::trace;

/// Variable names shared by the compiler and the shaper.
pub mod vars {
    pub const RECIPE: &str = "recipe";
    pub const NAME: &str = "name";
    pub const INSTRUCTIONS: &str = "instructions";
    pub const VEGAN: &str = "vegan";
    pub const VEGETARIAN: &str = "vegetarian";
    pub const TIME_NODE: &str = "time_node";
    pub const TIME: &str = "time";
    pub const DIFFICULTY_NODE: &str = "difficulty_node";
    pub const DIFFICULTY: &str = "difficulty";
    pub const MEAL_TYPE_NODE: &str = "meal_type_node";
    pub const MEAL_TYPE: &str = "meal_type";
    pub const INGREDIENT_WITH_AMOUNT: &str = "iwa";
    pub const INGREDIENT_LINE: &str = "ingredient_line";
    pub const INGREDIENTS: &str = "ingredients";

    pub fn nutrient_node(param: &str) -> String {
        format!("{}_node", param)
    }
}

/// Compiles a validated filter set into a plan that scans every recipe.
pub fn compile(filters: &FilterSet) -> QueryPlan {
    let mut steps = vec![Step::scan(vars::RECIPE, NodeLabel::Recipe)];
    push_base_pattern(&mut steps, filters.meal_type.is_some());
    push_constraints(&mut steps, filters);
    push_ingredient_terms(&mut steps, &filters.ingredients);
    push_ingredient_lines(&mut steps);

    let plan = QueryPlan::new(steps, Some(group_by()), vars::RECIPE);
    trace!(steps = plan.steps.len(), "Compiled search plan");
    plan
}

/// Compiles a point lookup of one recipe by its stable identity.
pub fn compile_lookup(slug: &str) -> QueryPlan {
    let mut steps = vec![Step::lookup(vars::RECIPE, NodeLabel::Recipe, slug)];
    push_base_pattern(&mut steps, false);
    push_ingredient_lines(&mut steps);
    QueryPlan::new(steps, Some(group_by()), vars::RECIPE)
}

fn push_base_pattern(steps: &mut Vec<Step>, meal_type_required: bool) {
    let r = vars::RECIPE;
    steps.push(Step::required_property(r, Property::RecipeName, vars::NAME));
    steps.push(Step::required_property(r, Property::Instructions, vars::INSTRUCTIONS));
    steps.push(Step::required_property(r, Property::IsVegan, vars::VEGAN));
    steps.push(Step::required_property(r, Property::IsVegetarian, vars::VEGETARIAN));

    steps.push(Step::Require(vec![
        Step::traverse(r, Relation::RequiresTime, vars::TIME_NODE),
        Step::property(vars::TIME_NODE, Property::AmountOfTime, vars::TIME),
    ]));
    steps.push(Step::Require(vec![
        Step::traverse(r, Relation::HasDifficulty, vars::DIFFICULTY_NODE),
        Step::property(vars::DIFFICULTY_NODE, Property::NumericDifficulty, vars::DIFFICULTY),
    ]));

    for nutrient in Nutrient::ALL {
        let node = vars::nutrient_node(nutrient.param());
        steps.push(Step::Require(vec![
            Step::traverse(r, nutrient.relation(), &node),
            Step::property(&node, nutrient.amount_property(), nutrient.param()),
        ]));
    }

    let meal_type = vec![
        Step::traverse(r, Relation::IsMealType, vars::MEAL_TYPE_NODE),
        Step::property(vars::MEAL_TYPE_NODE, Property::MealTypeName, vars::MEAL_TYPE),
    ];
    if meal_type_required {
        steps.extend(meal_type);
    } else {
        steps.push(Step::Optional(meal_type));
    }
}

fn push_constraints(steps: &mut Vec<Step>, filters: &FilterSet) {
    let mut filter = |c: Constraint| steps.push(Step::Filter(c));

    for (nutrient, range) in &filters.nutrients {
        if let Some(min) = range.min {
            filter(Constraint::compare(nutrient.param(), Comparison::Gt, min));
        }
        if let Some(max) = range.max {
            filter(Constraint::compare(nutrient.param(), Comparison::Lt, max));
        }
    }
    if let Some(max_time) = filters.max_time {
        filter(Constraint::compare(vars::TIME, Comparison::Lt, max_time));
    }
    if let Some(vegan) = filters.vegan {
        filter(Constraint::compare(vars::VEGAN, Comparison::Eq, vegan));
    }
    if let Some(vegetarian) = filters.vegetarian {
        filter(Constraint::compare(vars::VEGETARIAN, Comparison::Eq, vegetarian));
    }
    if let Some(meal_type) = filters.meal_type.as_deref() {
        filter(Constraint::compare(vars::MEAL_TYPE, Comparison::Eq, meal_type));
    }
    if let Some(difficulty) = filters.difficulty {
        filter(Constraint::compare(vars::DIFFICULTY, Comparison::Eq, difficulty));
    }
}

/// One aliased join chain per term. The chains are matched jointly so that N terms need N
/// distinct ingredient lines, without multiplying result rows.
fn push_ingredient_terms(steps: &mut Vec<Step>, terms: &[String]) {
    if terms.is_empty() {
        return;
    }
    let blocks = terms
        .iter()
        .enumerate()
        .map(|(i, term)| {
            let ext = format!("ext_ing_{}", i);
            let ing = format!("ing_{}", i);
            let name = format!("ing_name_{}", i);
            MatchBlock {
                steps: vec![
                    Step::traverse(vars::RECIPE, Relation::HasIngredient, &ext),
                    Step::traverse(&ext, Relation::TypeOfIngredient, &ing),
                    Step::property(&ing, Property::IngredientName, &name),
                    Step::Filter(Constraint::contains_ignore_case(&name, term)),
                ],
                var: ext,
            }
        })
        .collect();
    steps.push(Step::DistinctMatch(blocks));
}

fn push_ingredient_lines(steps: &mut Vec<Step>) {
    steps.push(Step::traverse(
        vars::RECIPE,
        Relation::HasIngredient,
        vars::INGREDIENT_WITH_AMOUNT,
    ));
    steps.push(Step::property(
        vars::INGREDIENT_WITH_AMOUNT,
        Property::IngredientWithAmountName,
        vars::INGREDIENT_LINE,
    ));
}

fn group_by() -> GroupBy {
    let mut key: Vec<String> = [
        vars::RECIPE,
        vars::NAME,
        vars::INSTRUCTIONS,
        vars::VEGAN,
        vars::VEGETARIAN,
        vars::TIME,
        vars::DIFFICULTY,
        vars::MEAL_TYPE,
    ]
    .iter()
    .map(|v| v.to_string())
    .collect();
    key.extend(Nutrient::ALL.iter().map(|n| n.param().to_string()));
    GroupBy {
        key,
        collect: vars::INGREDIENT_LINE.to_string(),
        into: vars::INGREDIENTS.to_string(),
    }
}
