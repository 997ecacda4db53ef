//! Upward sponsor-chain resolution.

use crate::db::Repository;
use crate::domain::OwnerId;
use crate::engine::Ancestor;
use sqlx::sqlite::SqliteConnection;
use std::collections::HashSet;
use tracing::warn;

/// Walk the sponsor chain upward from `owner`, yielding ancestors with
/// levels 1..=max_depth in increasing order.
///
/// The walk runs on the settling unit's transaction so commission credits
/// land on the same sponsor snapshot the resolver saw. Two stop conditions
/// besides depth: a missing sponsor ends the chain normally, and a revisited
/// owner ends it early — the sponsor graph is supposed to be a forest, but a
/// latent cycle must degrade to a bounded walk, not an infinite loop.
pub async fn resolve_ancestors(
    repo: &Repository,
    conn: &mut SqliteConnection,
    owner: &OwnerId,
    max_depth: u32,
) -> Result<Vec<Ancestor>, sqlx::Error> {
    let mut ancestors = Vec::new();
    let mut seen: HashSet<OwnerId> = HashSet::new();
    seen.insert(owner.clone());

    let mut current = owner.clone();
    for level in 1..=max_depth {
        let Some(sponsor) = repo.sponsor_of(conn, &current).await? else {
            break;
        };
        if !seen.insert(sponsor.clone()) {
            warn!(
                owner = %owner,
                at = %sponsor,
                level,
                "Sponsor chain revisits an owner; stopping traversal"
            );
            break;
        }
        ancestors.push(Ancestor {
            owner: sponsor.clone(),
            level,
        });
        current = sponsor;
    }

    Ok(ancestors)
}
