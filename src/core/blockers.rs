use crate::domain::model::{BlockerReport, Issue};
use crate::domain::ports::IssueSource;
use crate::utils::error::Result;
use std::collections::HashMap;

/// Walks the transitive closure of `root`'s `blocks` relation. The result
/// map doubles as the visited set, so cycles terminate and every reachable
/// issue is fetched and returned exactly once. Issues the source cannot
/// resolve (restricted ids) are skipped.
pub async fn expand_blockers<S: IssueSource>(
    source: &S,
    root: &Issue,
) -> Result<HashMap<u64, Issue>> {
    tracing::debug!("expanding blockers of bug {}", root.id);

    let mut found: HashMap<u64, Issue> = HashMap::new();
    let mut pending: Vec<u64> = root.blocks.clone();

    while let Some(id) = pending.pop() {
        if found.contains_key(&id) {
            continue;
        }
        let Some(issue) = source.issue(id).await? else {
            continue;
        };
        pending.extend(issue.blocks.iter().copied());
        found.insert(id, issue);
    }

    Ok(found)
}

/// Builds a report for every root with more than 2 direct blockers,
/// classifying each transitively-found blocker by status. Reports are
/// ordered by descending blocker total.
pub async fn collect_blockers<S: IssueSource>(
    source: &S,
    roots: &[Issue],
) -> Result<Vec<BlockerReport>> {
    let mut reports = Vec::new();

    for root in roots {
        if root.blocks.len() <= 2 {
            continue;
        }

        let expanded = expand_blockers(source, root).await?;
        let mut ids: Vec<u64> = expanded.keys().copied().collect();
        ids.sort_unstable();

        let mut open = Vec::new();
        let mut closed = Vec::new();
        for id in ids {
            let issue = expanded[&id].clone();
            if issue.status == "RESOLVED" {
                closed.push(issue);
            } else {
                open.push(issue);
            }
        }

        reports.push(BlockerReport {
            id: root.id,
            summary: root.summary.clone().unwrap_or_default(),
            total: open.len() + closed.len(),
            open,
            closed,
        });
    }

    reports.sort_by(|a, b| b.total.cmp(&a.total).then(a.id.cmp(&b.id)));
    Ok(reports)
}
