use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use feinschmecker_core::{QuerySettings, RawParams};
use feinschmecker_graph::{load_documents, IngredientLine, NutrientFacts, RecipeDocument, StoreHandle};
use feinschmecker_query::RecipeSearchEngine;
use std::hint::black_box;
use std::sync::Arc;

const PANTRY: [&str; 8] = [
    "egg", "flour", "butter", "tomato", "garlic", "onion", "rice", "spinach",
];

/// Synthetic corpus: every recipe uses four pantry items and alternates vegan flags.
fn corpus(size: usize) -> Vec<RecipeDocument> {
    (0..size)
        .map(|i| RecipeDocument {
            title: format!("Recipe {}", i),
            instructions: vec!["Step 1 Mix.".into(), "Step 2 Bake.".into()],
            ingredients: (0..4)
                .map(|j| {
                    let item = PANTRY[(i + j) % PANTRY.len()];
                    IngredientLine {
                        id: format!("{} {}", j + 1, item),
                        ingredient: item.to_string(),
                        amount: None,
                        unit: None,
                    }
                })
                .collect(),
            author: format!("Cook {}", i % 17),
            time: (10 + i % 80) as i64,
            meal_type: Some(["Breakfast", "Lunch", "Dinner"][i % 3].to_string()),
            vegan: i % 2 == 0,
            vegetarian: i % 3 != 0,
            nutrients: NutrientFacts {
                kcal: 200.0 + (i % 600) as f64,
                protein: (i % 40) as f64,
                fat: (i % 30) as f64,
                carbs: (i % 90) as f64,
            },
            source: None,
            image: None,
        })
        .collect()
}

fn params(pairs: &[(&str, &str)]) -> RawParams {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn bench_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("recipe_search");
    let queries = [
        ("unfiltered", params(&[])),
        ("vegan_quick", params(&[("vegan", "true"), ("time", "30")])),
        ("ingredients", params(&[("ingredients", "egg,flour")])),
        (
            "nutrients",
            params(&[("calories_max", "500"), ("protein_min", "10")]),
        ),
    ];

    for size in [100usize, 1_000] {
        let (graph, _) = load_documents(&corpus(size)).unwrap();
        let engine = RecipeSearchEngine::new(
            Arc::new(StoreHandle::with_graph(graph)),
            QuerySettings::default(),
        );

        for (name, raw) in &queries {
            let query = engine.validator().validate(raw).unwrap();
            group.bench_with_input(BenchmarkId::new(*name, size), &query, |b, q| {
                b.iter(|| black_box(engine.search_validated(q).unwrap()))
            });
        }

        group.bench_with_input(BenchmarkId::new("cached", size), &queries[1].1, |b, raw| {
            b.iter(|| black_box(engine.search(raw).unwrap()))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_search);
criterion_main!(benches);
