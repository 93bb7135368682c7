//! Keyword based database selection.

use common::models::{SelectionCandidate, SelectionRecommendation};

/// Keyword table in priority order. Earlier entries win ties.
const KEYWORDS: &[(&str, &[&str])] = &[
    (
        "alarms",
        &[
            "alarm",
            "alert",
            "incident",
            "fault",
            "event",
            "severity",
            "notification",
            "outage",
        ],
    ),
    (
        "resources",
        &[
            "node",
            "compute",
            "inventory",
            "resource",
            "hardware",
            "server",
            "cpu",
            "memory",
            "storage",
            "capacity",
        ],
    ),
    (
        "clusters",
        &[
            "cluster",
            "pod",
            "workload",
            "deployment",
            "namespace",
            "container",
            "kubernetes",
            "upgrade",
        ],
    ),
];

/// Recommends a logical database for a natural language description.
#[derive(Debug, Clone)]
pub struct DatabaseSelector {
    table: Vec<(String, Vec<String>)>,
}

impl Default for DatabaseSelector {
    fn default() -> Self {
        Self {
            table: KEYWORDS
                .iter()
                .map(|(db, words)| {
                    (
                        db.to_string(),
                        words.iter().map(|w| w.to_string()).collect(),
                    )
                })
                .collect(),
        }
    }
}

impl DatabaseSelector {
    /// Scores every database by the number of distinct keywords found in
    /// `description`. A keyword matches any token that starts with it.
    pub fn recommend(&self, description: &str) -> SelectionRecommendation {
        let lowered = description.to_lowercase();
        let tokens: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();

        let mut candidates: Vec<SelectionCandidate> = self
            .table
            .iter()
            .filter_map(|(database, keywords)| {
                let matched: Vec<String> = keywords
                    .iter()
                    .filter(|k| tokens.iter().any(|t| t.starts_with(k.as_str())))
                    .cloned()
                    .collect();
                (!matched.is_empty()).then(|| SelectionCandidate {
                    database: database.clone(),
                    hits: matched.len(),
                    matched_keywords: matched,
                })
            })
            .collect();

        // stable: ties keep table order
        candidates.sort_by(|a, b| b.hits.cmp(&a.hits));

        let total: usize = candidates.iter().map(|c| c.hits).sum();
        if candidates.is_empty() {
            return SelectionRecommendation {
                recommended_database: None,
                confidence: 0.0,
                matched_keywords: Vec::new(),
                alternatives: Vec::new(),
                message: "No database keywords matched. Use list_all_databases to see what is available."
                    .to_string(),
            };
        }

        let winner = candidates.remove(0);
        let confidence = winner.hits as f64 / total as f64;
        tracing::debug!(database = %winner.database, hits = winner.hits, confidence, "database selected");

        SelectionRecommendation {
            message: format!(
                "Recommended database '{}' (matched: {})",
                winner.database,
                winner.matched_keywords.join(", ")
            ),
            recommended_database: Some(winner.database),
            confidence,
            matched_keywords: winner.matched_keywords,
            alternatives: candidates,
        }
    }

    /// 只推荐可查询的数据库
    ///
    /// # Arguments
    /// * `description` - 自然语言描述
    /// * `available` - 当前可查询的数据库名称
    ///
    /// # Returns
    /// 关键字命中的数据库不可用时，改为命中次数最高的可用数据库；都不可用时
    /// 回退到唯一的可用数据库（通常是 `main`），置信度为 0。
    pub fn recommend_available(
        &self,
        description: &str,
        available: &[String],
    ) -> SelectionRecommendation {
        let mut rec = self.recommend(description);
        let is_available = |db: &str| available.iter().any(|a| a == db);

        let preferred = match rec.recommended_database.take() {
            Some(db) if is_available(&db) => {
                rec.recommended_database = Some(db);
                return rec;
            }
            other => other,
        };

        let total = rec.matched_keywords.len() + rec.alternatives.iter().map(|c| c.hits).sum::<usize>();
        let unavailable_note = preferred
            .as_ref()
            .map(|db| format!("Database '{}' matched best but is not available. ", db))
            .unwrap_or_default();

        if let Some(pos) = rec.alternatives.iter().position(|c| is_available(&c.database)) {
            let chosen = rec.alternatives.remove(pos);
            if let Some(db) = preferred {
                rec.alternatives.insert(
                    0,
                    SelectionCandidate {
                        database: db,
                        hits: rec.matched_keywords.len(),
                        matched_keywords: std::mem::take(&mut rec.matched_keywords),
                    },
                );
            }
            rec.message = format!(
                "{}Recommended database '{}' (matched: {})",
                unavailable_note,
                chosen.database,
                chosen.matched_keywords.join(", ")
            );
            rec.confidence = chosen.hits as f64 / total as f64;
            rec.recommended_database = Some(chosen.database);
            rec.matched_keywords = chosen.matched_keywords;
            return rec;
        }

        match available {
            [only] => {
                rec.message = format!(
                    "{}'{}' is the only available database.",
                    unavailable_note, only
                );
                rec.recommended_database = Some(only.clone());
                rec.confidence = 0.0;
                rec.matched_keywords = Vec::new();
            }
            _ if preferred.is_some() => {
                rec.message = format!(
                    "{}Use list_all_databases to see what is available.",
                    unavailable_note
                );
                rec.confidence = 0.0;
                rec.matched_keywords = Vec::new();
            }
            _ => {}
        }
        rec
    }
}
