//! Periodic consistency sweeps over the persisted chain (SPEC_FULL.md
//! §4.6). These checks are read-only: they report gaps, they never repair
//! them — repair happens by re-enqueuing the missing heights through the
//! worker pool.

use sqlx::PgPool;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DoctorError {
    #[error("database error while checking for block gaps: {0}")]
    Database(#[from] sqlx::Error),
}

/// A contiguous run of heights present upstream but absent from `block`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockGap {
    pub from_height: i64,
    pub to_height: i64,
}

/// Finds gaps in `block.height` between 0 and `max_height` inclusive using
/// `generate_series` anti-joined against the table — cheap even over a
/// chain with millions of blocks, since it never materializes a row per
/// known block.
pub async fn find_block_gaps(pool: &PgPool, max_height: i64) -> Result<Vec<BlockGap>, DoctorError> {
    let missing_heights: Vec<i64> = sqlx::query_scalar(
        "SELECT h.height
         FROM generate_series(0, $1) AS h(height)
         LEFT JOIN block ON block.height = h.height
         WHERE block.indep_hash IS NULL
         ORDER BY h.height",
    )
    .bind(max_height)
    .fetch_all(pool)
    .await?;

    Ok(collapse_into_gaps(&missing_heights))
}

fn collapse_into_gaps(missing_heights: &[i64]) -> Vec<BlockGap> {
    let mut gaps = Vec::new();
    let mut iter = missing_heights.iter().copied();
    let Some(first) = iter.next() else {
        return gaps;
    };

    let mut from_height = first;
    let mut to_height = first;
    for height in iter {
        if height == to_height + 1 {
            to_height = height;
        } else {
            gaps.push(BlockGap { from_height, to_height });
            from_height = height;
            to_height = height;
        }
    }
    gaps.push(BlockGap { from_height, to_height });
    gaps
}

/// Cross-checks `height_by_hash` against the upstream hash list
/// (`node::NodeClient::get_hash_list`), returning heights whose persisted
/// hash disagrees with what the node currently reports — a second,
/// independent signal from `find_block_gaps`, since a height can be
/// present with the *wrong* hash after an unresolved fork.
pub async fn find_missing_blocks(
    pool: &PgPool,
    upstream_hash_list: &[String],
) -> Result<Vec<i64>, DoctorError> {
    let persisted: Vec<(i64, String)> =
        sqlx::query_as("SELECT height, indep_hash FROM block ORDER BY height")
            .fetch_all(pool)
            .await?;
    let persisted_by_height: HashMap<i64, String> = persisted.into_iter().collect();

    let mismatched = upstream_hash_list
        .iter()
        .enumerate()
        .filter_map(|(height, upstream_hash)| {
            let height = height as i64;
            match persisted_by_height.get(&height) {
                Some(local_hash) if local_hash == upstream_hash => None,
                _ => Some(height),
            }
        })
        .collect();

    Ok(mismatched)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapse_merges_consecutive_heights() {
        let gaps = collapse_into_gaps(&[3, 4, 5, 9, 10, 20]);
        assert_eq!(
            gaps,
            vec![
                BlockGap { from_height: 3, to_height: 5 },
                BlockGap { from_height: 9, to_height: 10 },
                BlockGap { from_height: 20, to_height: 20 },
            ]
        );
    }

    #[test]
    fn collapse_of_empty_input_is_empty() {
        assert!(collapse_into_gaps(&[]).is_empty());
    }

    #[test]
    fn collapse_single_height_is_one_gap() {
        assert_eq!(
            collapse_into_gaps(&[42]),
            vec![BlockGap { from_height: 42, to_height: 42 }]
        );
    }
}
