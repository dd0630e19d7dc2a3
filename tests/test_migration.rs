/// Moving a populated index into year shards and between years, with
/// searches and writes running alongside.
mod common;

use common::{sorted_refs, Fixture, JUNE_2013, JUNE_2015};
use coursesearch::query::ScopeRestrictions;
use coursesearch::{
    Course, CourseSearchError, DocumentUpdate, MigrationMode, MigrationScheduler, SearchSettings, Shard,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

// 2009-03-01 and 2021-09-01 (UTC)
const MARCH_2009: i64 = 1_235_865_600;
const SEPT_2021: i64 = 1_630_454_400;

fn courses() -> Vec<Course> {
    vec![Course::new(1, "C1", JUNE_2013), Course::new(2, "C2", JUNE_2015)]
}

/// Seven documents in C1, three in C2 and two outside any course, all
/// containing "frog", with distinct modification times.
fn populated(settings: SearchSettings) -> Fixture {
    let fx = Fixture::with_settings(courses(), settings);
    let mut time = 1_000;
    let mut add = |n: i64, course: Option<i64>| {
        time += 10;
        fx.add_at(Fixture::key(n, course), &format!("Frog {}", n), "green frog", time);
    };
    for n in 1..=7 {
        add(n, Some(1));
    }
    for n in 8..=10 {
        add(n, Some(2));
    }
    add(11, None);
    add(12, None);
    fx
}

fn all_refs() -> Vec<i64> {
    (1..=12).collect()
}

fn assert_searches_unchanged(fx: &Fixture) {
    assert_eq!(sorted_refs(&fx.search("frog")), all_refs());
    assert_eq!(
        sorted_refs(&fx.search_in("frog", &ScopeRestrictions::for_course(1))),
        (1..=7).collect::<Vec<_>>()
    );
    assert_eq!(
        sorted_refs(&fx.search_in("frog", &ScopeRestrictions::for_course(2))),
        vec![8, 9, 10]
    );
}

// ============================================================================
// Split
// ============================================================================

#[test]
fn test_split_moves_everything_to_year_shards() {
    let fx = populated(SearchSettings::default());
    assert_searches_unchanged(&fx);

    let engine = fx.index.migration();
    engine.start_transfer().unwrap();

    let mut last = engine.state().unwrap();
    let mut calls = 0;
    while !engine.split_chunk(3).unwrap() {
        calls += 1;
        assert!(calls < 50, "split never finished");
        assert_searches_unchanged(&fx);

        let state = engine.state().unwrap();
        if state.transferring_course_id == last.transferring_course_id {
            assert!(state.done_up_to >= last.done_up_to, "checkpoint went backwards");
        } else {
            assert!(state.transferring_course_id > last.transferring_course_id);
            assert_eq!(state.done_up_to, None);
        }
        last = state;
    }

    assert_eq!(engine.state().unwrap().mode, MigrationMode::On);
    assert_eq!(engine.progress().unwrap(), 1.0);
    assert_eq!(fx.count(Shard::Unpartitioned), 0);
    assert_eq!(fx.count(Shard::Year(2013)), 7);
    assert_eq!(fx.count(Shard::Year(2015)), 3);
    assert_eq!(fx.count(Shard::Year(2011)), 2);
    assert_searches_unchanged(&fx);
}

#[test]
fn test_split_with_no_documents_walks_every_course() {
    let fx = Fixture::new(vec![
        Course::new(1, "C1", JUNE_2013),
        Course::new(2, "C2", JUNE_2013),
        Course::new(3, "C3", JUNE_2015),
    ]);
    let engine = fx.index.migration();
    engine.start_transfer().unwrap();

    let results: Vec<bool> = (0..4).map(|_| engine.split_chunk(10).unwrap()).collect();
    assert_eq!(results, vec![false, false, false, true]);
    assert_eq!(engine.state().unwrap().mode, MigrationMode::On);
    assert!(matches!(
        engine.split_chunk(10),
        Err(CourseSearchError::InvalidState(_))
    ));
    assert!(matches!(
        engine.start_transfer(),
        Err(CourseSearchError::InvalidState(_))
    ));
}

#[test]
fn test_split_resumes_after_failure() {
    let fx = populated(SearchSettings::default());
    let engine = fx.index.migration();
    engine.start_transfer().unwrap();
    assert!(!engine.split_chunk(100).unwrap()); // non-course documents

    let before = engine.state().unwrap();
    fx.storage.inject_failure_after(5);
    assert!(matches!(engine.split_chunk(100), Err(CourseSearchError::Storage(_))));
    fx.storage.clear_injected_failure();

    // Nothing from the failed chunk was kept
    assert_eq!(engine.state().unwrap(), before);
    assert_eq!(fx.count(Shard::Year(2013)), 0);
    assert_searches_unchanged(&fx);

    while !engine.split_chunk(100).unwrap() {}
    assert_eq!(fx.count(Shard::Year(2013)), 7);
    assert_eq!(fx.count(Shard::Year(2015)), 3);
    assert_searches_unchanged(&fx);
}

#[test]
fn test_split_never_ends_chunk_inside_a_timestamp() {
    let fx = Fixture::new(courses());
    for n in 1..=5 {
        fx.add_at(Fixture::key(n, Some(1)), "Frog", "green", 500);
    }
    fx.add_at(Fixture::key(6, Some(1)), "Frog", "green", 600);

    let engine = fx.index.migration();
    engine.start_transfer().unwrap();
    assert!(!engine.split_chunk(2).unwrap()); // non-course documents
    assert!(!engine.split_chunk(2).unwrap());

    let state = engine.state().unwrap();
    assert_eq!(state.transferring_course_id, Some(1));
    assert_eq!(state.done_up_to, Some(500));
    assert_eq!(fx.count(Shard::Year(2013)), 5);
    assert_eq!(fx.count(Shard::Unpartitioned), 1);
}

#[test]
fn test_writes_during_split_land_in_one_shard() {
    let fx = populated(SearchSettings::default());
    let engine = fx.index.migration();
    engine.start_transfer().unwrap();
    assert!(!engine.split_chunk(3).unwrap()); // non-course documents
    assert!(!engine.split_chunk(3).unwrap()); // first three of C1

    // One document already moved, one still waiting
    fx.add(Fixture::key(1, Some(1)), "Frog 1", "green frog updated");
    fx.add(Fixture::key(7, Some(1)), "Frog 7", "green frog updated");
    fx.add(Fixture::key(13, None), "Frog 13", "green frog");
    assert_eq!(fx.count(Shard::Year(2011)), 3);

    while !engine.split_chunk(3).unwrap() {}
    assert_eq!(fx.count(Shard::Year(2013)), 7);
    assert_eq!(
        sorted_refs(&fx.search("updated")),
        vec![1, 7]
    );
    assert_eq!(sorted_refs(&fx.search("frog")).len(), 13);
}

#[test]
fn test_write_dated_behind_checkpoint_survives_split() {
    let fx = Fixture::new(vec![Course::new(1, "C1", JUNE_2013)]);
    for n in 1..=4 {
        fx.add_at(Fixture::key(n, Some(1)), "Frog", "green", n * 100);
    }
    let engine = fx.index.migration();
    engine.start_transfer().unwrap();
    assert!(!engine.split_chunk(2).unwrap()); // non-course documents
    assert!(!engine.split_chunk(2).unwrap());
    assert_eq!(engine.state().unwrap().done_up_to, Some(200));

    fx.add_at(Fixture::key(5, Some(1)), "Frog", "green", 150);
    assert_eq!(
        sorted_refs(&fx.search_in("frog", &ScopeRestrictions::for_course(1))),
        vec![1, 2, 3, 4, 5]
    );

    while !engine.split_chunk(2).unwrap() {}
    assert_eq!(fx.count(Shard::Year(2013)), 5);
    assert_eq!(sorted_refs(&fx.search("frog")), vec![1, 2, 3, 4, 5]);
}

#[test]
fn test_non_course_write_dated_behind_checkpoint_survives_split() {
    let fx = Fixture::new(courses());
    for n in 1..=3 {
        fx.add_at(Fixture::key(n, None), "Frog", "green", n * 100);
    }
    let engine = fx.index.migration();
    engine.start_transfer().unwrap();
    assert!(!engine.split_chunk(1).unwrap());
    assert_eq!(engine.state().unwrap().done_up_to, Some(100));

    fx.add_at(Fixture::key(4, None), "Frog", "green", 50);
    while !engine.split_chunk(1).unwrap() {}
    assert_eq!(fx.count(Shard::Year(2011)), 4);
    assert_eq!(sorted_refs(&fx.search("frog")), vec![1, 2, 3, 4]);
}

#[test]
fn test_future_course_blocks_split() {
    let fx = Fixture::new(vec![Course::new(1, "Future", SEPT_2021)]);
    fx.add(Fixture::key(1, Some(1)), "Frog", "green");
    let engine = fx.index.migration();
    engine.start_transfer().unwrap();
    assert!(!engine.split_chunk(10).unwrap());

    let result = engine.split_chunk(10);
    assert!(matches!(
        result,
        Err(CourseSearchError::FutureYear { course_id: 1, year: 2021, max_year: 2020 })
    ));
    assert_eq!(engine.state().unwrap().transferring_course_id, Some(1));
    assert_eq!(sorted_refs(&fx.search("frog")), vec![1]);
}

#[test]
fn test_old_courses_use_first_year() {
    let fx = Fixture::new(vec![Course::new(1, "Old", MARCH_2009)]);
    fx.add(Fixture::key(1, Some(1)), "Frog", "green");
    let engine = fx.index.migration();
    engine.start_transfer().unwrap();
    while !engine.split_chunk(10).unwrap() {}
    assert_eq!(fx.count(Shard::Year(2011)), 1);
}

#[test]
fn test_split_random_layout_with_shared_timestamps() {
    let mut rng = StdRng::seed_from_u64(7);
    let fx = Fixture::new(
        (1..=5)
            .map(|id| Course::new(id, format!("C{}", id), if id % 2 == 0 { JUNE_2015 } else { JUNE_2013 }))
            .collect(),
    );
    for n in 1..=60 {
        let course = match rng.gen_range(0..6) {
            0 => None,
            c => Some(c),
        };
        fx.add_at(Fixture::key(n, course), "Frog", "green", rng.gen_range(0..10));
    }
    let expected: Vec<i64> = (1..=60).collect();

    let engine = fx.index.migration();
    engine.start_transfer().unwrap();
    let mut calls = 0;
    while !engine.split_chunk(rng.gen_range(1..8)).unwrap() {
        calls += 1;
        assert!(calls < 200, "split never finished");
        assert_eq!(sorted_refs(&fx.search("frog")), expected);
    }

    let moved: usize = [2011, 2013, 2015].iter().map(|&y| fx.count(Shard::Year(y))).sum();
    assert_eq!(moved, 60);
    assert_eq!(sorted_refs(&fx.search("frog")), expected);
}

// ============================================================================
// Course year changes
// ============================================================================

fn migrated() -> Fixture {
    let fx = populated(SearchSettings::default());
    let engine = fx.index.migration();
    engine.start_transfer().unwrap();
    while !engine.split_chunk(100).unwrap() {}
    fx
}

fn move_course(fx: &Fixture, start_date: i64) {
    let course = Course::new(1, "C1", start_date);
    fx.catalog.upsert(course.clone()).unwrap();
    fx.index.migration().on_course_updated(&course).unwrap();
}

#[test]
fn test_redate_moves_course_documents() {
    let fx = migrated();
    move_course(&fx, JUNE_2015);
    assert_searches_unchanged(&fx);

    // New writes go to the new year straight away
    fx.add(Fixture::key(1, Some(1)), "Frog 1", "green frog");
    assert_eq!(fx.count(Shard::Year(2013)), 6);
    assert_eq!(fx.count(Shard::Year(2015)), 4);
    assert_searches_unchanged(&fx);

    let engine = fx.index.migration();
    let mut calls = 0;
    while !engine.redate_chunk(2).unwrap() {
        calls += 1;
        assert_searches_unchanged(&fx);
    }
    assert_eq!(calls, 2);
    assert_eq!(fx.count(Shard::Year(2013)), 0);
    assert_eq!(fx.count(Shard::Year(2015)), 10);
    assert_searches_unchanged(&fx);
}

#[test]
fn test_redate_there_and_back() {
    let fx = migrated();
    let engine = fx.index.migration();

    move_course(&fx, JUNE_2015);
    assert!(engine.run_redate_task().unwrap().finished);
    assert_eq!(fx.count(Shard::Year(2015)), 10);

    move_course(&fx, JUNE_2013);
    assert_searches_unchanged(&fx);
    assert!(engine.run_redate_task().unwrap().finished);
    assert_eq!(fx.count(Shard::Year(2013)), 7);
    assert_eq!(fx.count(Shard::Year(2015)), 3);
    assert_searches_unchanged(&fx);
}

#[test]
fn test_change_back_before_redate_runs() {
    let fx = migrated();
    move_course(&fx, JUNE_2015);
    move_course(&fx, JUNE_2013);
    assert_searches_unchanged(&fx);

    let report = fx.index.migration().run_redate_task().unwrap();
    assert!(report.finished);
    assert_eq!(fx.count(Shard::Year(2013)), 7);
    assert_searches_unchanged(&fx);
}

#[test]
fn test_created_course_gets_year_record() {
    let fx = migrated();
    let course = Course::new(3, "C3", JUNE_2015);
    fx.catalog.upsert(course.clone()).unwrap();
    fx.index.migration().on_course_created(&course).unwrap();

    fx.add(Fixture::key(20, Some(3)), "Frog", "green");
    assert_eq!(fx.count(Shard::Year(2015)), 4);
    assert_eq!(
        sorted_refs(&fx.search_in("frog", &ScopeRestrictions::for_course(3))),
        vec![20]
    );
}

// ============================================================================
// Scheduling
// ============================================================================

#[tokio::test]
async fn test_scheduler_tick_completes_migration() {
    let fx = populated(SearchSettings {
        split_chunk_size: 2,
        ..Default::default()
    });
    fx.index.migration().start_transfer().unwrap();

    let scheduler = MigrationScheduler::new(Arc::clone(&fx.index));
    let (split, redate) = scheduler.tick().await.unwrap();
    assert!(split.finished);
    assert!(split.chunks > 1);
    assert!(redate.finished);
    assert_eq!(fx.count(Shard::Unpartitioned), 0);
    assert_searches_unchanged(&fx);
}

#[test]
fn test_update_keeps_modified_time_when_not_given() {
    let fx = migrated();
    let key = Fixture::key(1, Some(1));
    let time_of = |fx: &Fixture| {
        fx.search_in("frog", &ScopeRestrictions::for_course(1))
            .hits()
            .iter()
            .find(|hit| hit.document.key.int_ref1 == Some(1))
            .map(|hit| hit.document.time_modified)
    };

    fx.index
        .update(&DocumentUpdate::new(key.clone(), "Frog 1", "green frog again"))
        .unwrap();
    assert_eq!(time_of(&fx), Some(1_010));

    fx.add_at(key, "Frog 1", "green frog", 5);
    assert_eq!(time_of(&fx), Some(5));
    assert_eq!(fx.count(Shard::Year(2013)), 7);
}
