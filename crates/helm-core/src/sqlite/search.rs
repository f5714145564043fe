use crate::models::{CoreResult, PackageCandidate, PackageRef, SearchHit};
use crate::persistence::SearchCacheStore;
use crate::registry;
use crate::sqlite::store::{SqliteStore, normalize_text, parse_manager, time_from_unix};

impl SearchCacheStore for SqliteStore {
    fn merge_hits(&self, hits: &[SearchHit]) -> CoreResult<()> {
        let rows: Vec<HitRow> = hits.iter().map(HitRow::from_hit).collect();
        self.with_write("merge_hits", move |connection| {
            let transaction = connection.transaction()?;
            {
                // Enrichment rule: a non-empty incoming summary fills an
                // empty stored one; an empty incoming summary never clears a
                // stored value. Versions follow the same rule.
                let mut statement = transaction.prepare(
                    "INSERT INTO search_cache
                        (source_manager, package_name, version, summary, origin_query,
                         last_enriched_at_unix)
                     VALUES (?1, ?2, ?3, ?4, ?5, strftime('%s', 'now'))
                     ON CONFLICT(source_manager, package_name) DO UPDATE SET
                        version = COALESCE(excluded.version, search_cache.version),
                        summary = COALESCE(search_cache.summary, excluded.summary),
                        origin_query = excluded.origin_query,
                        last_enriched_at_unix = excluded.last_enriched_at_unix",
                )?;
                for row in &rows {
                    statement.execute((
                        row.source_manager.as_str(),
                        row.name.as_str(),
                        row.version.as_deref(),
                        row.summary.as_deref(),
                        row.origin_query.as_str(),
                    ))?;
                }
            }
            transaction.commit()
        })
    }

    fn query_local(&self, query: &str, limit: usize) -> CoreResult<Vec<SearchHit>> {
        let needle = query.trim().to_lowercase();
        self.with_read("query_local", move |connection| {
            let mut statement = connection.prepare(
                "SELECT source_manager, package_name, version, summary, origin_query,
                        last_enriched_at_unix
                 FROM search_cache
                 ORDER BY package_name
                 ",
            )?;
            let rows = statement.query_map([], |row| {
                let manager: String = row.get(0)?;
                let manager = parse_manager(&manager)?;
                Ok(SearchHit {
                    candidate: PackageCandidate {
                        package: PackageRef::new(manager, row.get::<_, String>(1)?),
                        version: row.get(2)?,
                        summary: row.get(3)?,
                    },
                    source_manager: manager,
                    origin_query: row.get(4)?,
                    inserted_at: time_from_unix(row.get(5)?),
                })
            })?;

            let mut hits = Vec::new();
            for hit in rows {
                let hit = hit?;
                if needle.is_empty() || matches_query(&hit, &needle) {
                    hits.push(hit);
                    if hits.len() >= limit {
                        break;
                    }
                }
            }
            Ok(hits)
        })
    }
}

/// Fuzzy local match over the name, the source manager's display name, and
/// the summary.
fn matches_query(hit: &SearchHit, needle: &str) -> bool {
    if hit.candidate.package.name.to_lowercase().contains(needle) {
        return true;
    }
    if registry::descriptor(hit.source_manager)
        .display_name
        .to_lowercase()
        .contains(needle)
    {
        return true;
    }
    hit.candidate
        .summary
        .as_deref()
        .is_some_and(|summary| summary.to_lowercase().contains(needle))
}

struct HitRow {
    source_manager: crate::models::ManagerId,
    name: String,
    version: Option<String>,
    summary: Option<String>,
    origin_query: String,
}

impl HitRow {
    fn from_hit(hit: &SearchHit) -> Self {
        Self {
            source_manager: hit.source_manager,
            name: hit.candidate.package.name.clone(),
            version: normalize_text(hit.candidate.version.clone()),
            summary: normalize_text(hit.candidate.summary.clone()),
            origin_query: hit.origin_query.clone(),
        }
    }
}
