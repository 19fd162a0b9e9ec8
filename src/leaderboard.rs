use crate::model::{Role, display_name};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// A peer-group member as loaded from the users table.
#[derive(Debug, Clone)]
pub struct Member {
    pub id: i64,
    pub display_name: Option<String>,
    pub email: String,
    pub role: Role,
}

/// The per-lesson facts the ranking needs: identity and whether the lesson is
/// restricted to enhanced/admin members.
#[derive(Debug, Clone, Copy)]
pub struct LessonVisibility {
    pub id: i64,
    pub enhanced_only: bool,
}

/// One lesson_progress row. `percent` is raw column data and may be NULL or
/// out of range; `clamp_percent` sanitizes it.
#[derive(Debug, Clone)]
pub struct ProgressRow {
    pub user_id: i64,
    pub lesson_id: i64,
    pub percent: Option<f64>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct LeaderboardEntry {
    pub id: i64,
    pub name: String,
    pub percent: f64,
    pub rank: i64,
}

/// Missing and non-finite values count as 0; everything else is clamped into
/// [0, 100].
pub fn clamp_percent(raw: Option<f64>) -> f64 {
    match raw {
        Some(value) if value.is_finite() => value.clamp(0.0, 100.0),
        _ => 0.0,
    }
}

/// Ranks the members of one peer group.
///
/// Each member's score is the mean completion percentage over their eligible
/// lessons: every lesson for `admin`/`enhanced` members, standard lessons only
/// for `normal` members. The divisor is always the full eligible-lesson count,
/// so a missing progress row drags the average down instead of shrinking the
/// denominator. Members with no eligible lessons score 0.
///
/// Entries come back sorted descending by percent (ties broken by ascending
/// user id) with dense 1-based ranks, alongside the newest `updated_at` seen
/// across all progress rows.
pub fn rank_members(
    members: &[Member],
    lessons: &[LessonVisibility],
    progress: &[ProgressRow],
) -> (Vec<LeaderboardEntry>, Option<DateTime<Utc>>) {
    let standard_lessons: Vec<i64> = lessons
        .iter()
        .filter(|lesson| !lesson.enhanced_only)
        .map(|lesson| lesson.id)
        .collect();
    let all_lessons: Vec<i64> = lessons.iter().map(|lesson| lesson.id).collect();

    let mut lookup: HashMap<(i64, i64), f64> = HashMap::with_capacity(progress.len());
    let mut last_updated: Option<DateTime<Utc>> = None;
    for row in progress {
        lookup.insert((row.user_id, row.lesson_id), clamp_percent(row.percent));
        if let Some(updated_at) = row.updated_at {
            last_updated = Some(match last_updated {
                Some(current) => current.max(updated_at),
                None => updated_at,
            });
        }
    }

    let mut scored: Vec<(i64, String, f64)> = members
        .iter()
        .map(|member| {
            let eligible = if member.role.sees_enhanced_only() {
                &all_lessons
            } else {
                &standard_lessons
            };

            let average = if eligible.is_empty() {
                0.0
            } else {
                let sum: f64 = eligible
                    .iter()
                    .map(|lesson_id| {
                        lookup
                            .get(&(member.id, *lesson_id))
                            .copied()
                            .unwrap_or(0.0)
                    })
                    .sum();
                sum / eligible.len() as f64
            };

            let name = display_name(member.display_name.as_deref(), &member.email);
            (member.id, name, average)
        })
        .collect();

    // Inputs are clamped, so the averages are never NaN.
    scored.sort_by(|a, b| {
        b.2.partial_cmp(&a.2)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });

    let entries = scored
        .into_iter()
        .enumerate()
        .map(|(index, (id, name, percent))| LeaderboardEntry {
            id,
            name,
            percent,
            rank: index as i64 + 1,
        })
        .collect();

    (entries, last_updated)
}
