// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Tests to ensure in-memory databases don't create physical files

use anyhow::Result;
use chrono::Utc;
use std::fs;
use streak_engine::database::Database;
use streak_engine::models::{Competition, CompetitionType, DistanceUnit, NewCompetition};
use tempfile::TempDir;

fn apex(owner: &str) -> Result<Competition> {
    Ok(Competition::new(
        owner,
        NewCompetition {
            name: format!("{owner}'s apex"),
            competition_type: CompetitionType::Apex,
            workout_filters: Default::default(),
            goal: None,
            unit: DistanceUnit::Miles,
            lives_budget: None,
            interval_bucket: Some(Default::default()),
            duration_hours: Some(168),
        },
        Utc::now(),
    )?)
}

#[tokio::test]
async fn test_memory_database_no_physical_files() -> Result<()> {
    let database = Database::new("sqlite::memory:").await?;

    let current_dir = std::env::current_dir()?;
    for entry in fs::read_dir(&current_dir)? {
        let filename = entry?.file_name();
        let filename_str = filename.to_string_lossy();

        if filename_str.starts_with("sqlite::memory:") || filename_str.starts_with(":memory:") {
            panic!("Found physical file with memory database URL: {}", filename_str);
        }
    }

    let competition = apex("memo")?;
    let id = database.insert_competition(&competition).await?;
    let retrieved = database.get_competition(id).await?.unwrap();
    assert_eq!(retrieved.name, "memo's apex");

    Ok(())
}

#[tokio::test]
async fn test_multiple_memory_databases_isolated() -> Result<()> {
    let database1 = Database::new("sqlite::memory:").await?;
    let database2 = Database::new("sqlite::memory:").await?;

    let first = database1.insert_competition(&apex("one")?).await?;
    let second = database2.insert_competition(&apex("two")?).await?;

    assert!(database1.get_competition(first).await?.is_some());
    assert!(database2.get_competition(second).await?.is_some());

    assert!(database2.get_competition(first).await?.is_none());
    assert!(database1.get_competition(second).await?.is_none());

    Ok(())
}

#[tokio::test]
async fn test_file_database_persists_across_connections() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let url = format!("sqlite:{}", temp_dir.path().join("competitions.db").display());

    let competition = apex("file")?;
    {
        let database = Database::new(&url).await?;
        database.insert_competition(&competition).await?;
    }

    let reopened = Database::new(&url).await?;
    assert_eq!(reopened.get_competition(competition.id).await?, Some(competition));
    Ok(())
}
