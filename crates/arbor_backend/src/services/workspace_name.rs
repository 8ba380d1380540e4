use arbor_domain::sanitize_slug;
use rand::{Rng, rngs::OsRng, seq::SliceRandom as _};
use std::collections::HashSet;

/// Short, typeable names handed out to new workspaces.
pub const WORKSPACE_NAME_POOL: &[&str] = &[
    "Amsterdam", "Athens", "Austin", "Bangkok", "Berlin", "Bogota", "Boston", "Cairo",
    "Chicago", "Delhi", "Denver", "Dublin", "Geneva", "Hanoi", "Havana", "Helsinki",
    "Istanbul", "Jakarta", "Kyoto", "Lagos", "Lima", "Lisbon", "London", "Madrid",
    "Manila", "Melbourne", "Miami", "Milan", "Montreal", "Mumbai", "Munich", "Nairobi",
    "Naples", "Oslo", "Paris", "Porto", "Prague", "Quito", "Riga", "Rome", "Santiago",
    "Seattle", "Seoul", "Seville", "Sydney", "Taipei", "Tallinn", "Tokyo", "Toronto",
    "Tunis", "Valencia", "Vienna", "Vilnius", "Warsaw", "Zurich",
];

pub fn generate_unique_name(recent: &[String], existing: &HashSet<String>) -> String {
    generate_unique_name_with(&mut OsRng, WORKSPACE_NAME_POOL, recent, existing)
}

/// Picks uniformly from `pool - (recent ∪ existing)`; when that is empty,
/// from `pool - existing`; when that is empty too, synthesizes `"<Name> <n>"`
/// with the smallest `n` that is neither recent nor existing.
///
/// Names are compared by slug, so `existing` may hold directory names.
pub fn generate_unique_name_with<R: Rng + ?Sized>(
    rng: &mut R,
    pool: &[&str],
    recent: &[String],
    existing: &HashSet<String>,
) -> String {
    let existing: HashSet<String> = existing.iter().map(|n| sanitize_slug(n)).collect();
    let recent: HashSet<String> = recent.iter().map(|n| sanitize_slug(n)).collect();
    let is_existing = |name: &str| existing.contains(&sanitize_slug(name));
    let is_recent = |name: &str| recent.contains(&sanitize_slug(name));

    let fresh = pool
        .iter()
        .copied()
        .filter(|name| !is_existing(name) && !is_recent(name))
        .collect::<Vec<_>>();
    if let Some(name) = fresh.choose(rng) {
        return (*name).to_owned();
    }

    let reusable = pool
        .iter()
        .copied()
        .filter(|name| !is_existing(name))
        .collect::<Vec<_>>();
    if let Some(name) = reusable.choose(rng) {
        return (*name).to_owned();
    }

    let base = pool.first().copied().unwrap_or("Workspace");
    let mut n: u64 = 2;
    loop {
        let candidate = format!("{base} {n}");
        if !is_existing(&candidate) && !is_recent(&candidate) {
            return candidate;
        }
        n += 1;
    }
}
