//! Benchmarks for distance ranking and donor search
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use project_red::config::MatchingConfig;
use project_red::domain::{BloodGroup, Gender};
use project_red::geo::{distance_km, rank_by_distance, Coordinates};
use project_red::matching::Matcher;
use project_red::storage::{Database, NewUser};
use std::sync::Arc;
use tempfile::tempdir;

const KATHMANDU: Coordinates = Coordinates::new(27.7172, 85.3240);

/// Points spread over roughly 100 km around Kathmandu
fn create_test_points(count: usize) -> Vec<Coordinates> {
    (0..count)
        .map(|i| {
            let step = i as f64 / count as f64;
            Coordinates::new(
                27.2 + step * 1.0,
                84.8 + ((i * 7919) % count) as f64 / count as f64,
            )
        })
        .collect()
}

fn bench_distance(c: &mut Criterion) {
    let far = Coordinates::new(28.2096, 83.9856);
    c.bench_function("distance_km", |b| {
        b.iter(|| distance_km(black_box(KATHMANDU), black_box(far)))
    });
}

fn bench_rank(c: &mut Criterion) {
    let mut group = c.benchmark_group("rank_by_distance");

    for size in [100, 1_000, 10_000] {
        let points = create_test_points(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &points, |b, points| {
            b.iter(|| rank_by_distance(KATHMANDU, black_box(points.iter().copied()), 50.0))
        });
    }

    group.finish();
}

fn bench_nearby_donors(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let db = Arc::new(Database::open(dir.path().join("bench.db")).unwrap());
    let groups = [
        BloodGroup::APositive,
        BloodGroup::BPositive,
        BloodGroup::OPositive,
        BloodGroup::ONegative,
    ];

    for (i, location) in create_test_points(2_000).into_iter().enumerate() {
        db.create_user(&NewUser {
            username: format!("donor{i}"),
            email: format!("donor{i}@example.com"),
            password_hash: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            blood_group: groups[i % groups.len()],
            allergies: None,
            age: 30,
            gender: Gender::Female,
            address: String::new(),
            phone_number: String::new(),
            is_donor: true,
            is_recipient: false,
            is_staff: false,
            location: Some(location),
        })
        .unwrap();
    }

    let matcher = Matcher::new(Arc::clone(&db), MatchingConfig::default());

    let mut group = c.benchmark_group("nearby_donors");
    group.bench_function("any_group", |b| {
        b.iter(|| matcher.nearby_donors(KATHMANDU, None, 50.0, None).unwrap())
    });
    group.bench_function("o_negative", |b| {
        b.iter(|| {
            matcher
                .nearby_donors(KATHMANDU, Some(BloodGroup::ONegative), 50.0, None)
                .unwrap()
        })
    });
    group.finish();
}

criterion_group!(benches, bench_distance, bench_rank, bench_nearby_donors);
criterion_main!(benches);
