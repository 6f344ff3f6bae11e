//! Grouping of discovered chunks into region tiles.

use std::collections::HashMap;

use crate::chunk::ChunkRecord;
use crate::coords::RegionCoordinate;

/// The chunks of one region taking part in a pass.
#[derive(Clone, Debug)]
pub struct RegionSet {
    pub region: RegionCoordinate,
    pub chunks: Vec<ChunkRecord>,
}

/// Partition records by the region they fall in.
pub fn group_regions(records: &[ChunkRecord]) -> Vec<RegionSet> {
    let mut regions: HashMap<RegionCoordinate, Vec<ChunkRecord>> = HashMap::new();
    for record in records {
        regions.entry(record.coord.region()).or_default().push(*record);
    }

    regions
        .into_iter()
        .map(|(region, chunks)| RegionSet { region, chunks })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::ChunkCoordinate;
    use chrono::Utc;

    fn record(x: i32, z: i32) -> ChunkRecord {
        ChunkRecord {
            coord: ChunkCoordinate::new(x, z),
            last_modified: Utc::now(),
        }
    }

    #[test]
    fn test_grouping_across_zero() {
        let records = vec![record(-1, -1), record(0, 0), record(31, 31), record(-32, -32), record(-33, 5)];
        let mut regions = group_regions(&records);
        regions.sort_by_key(|r| r.region);

        let keys: Vec<_> = regions.iter().map(|r| r.region).collect();
        assert_eq!(
            keys,
            vec![RegionCoordinate::new(-2, 0), RegionCoordinate::new(-1, -1), RegionCoordinate::new(0, 0)]
        );
        assert_eq!(regions[1].chunks.len(), 2);
        assert_eq!(regions[2].chunks.len(), 2);
    }

    #[test]
    fn test_grouping_preserves_every_record() {
        let records: Vec<_> = (-40..40).step_by(7).flat_map(|x| (-40..40).step_by(9).map(move |z| record(x, z))).collect();
        let regions = group_regions(&records);
        let total: usize = regions.iter().map(|r| r.chunks.len()).sum();
        assert_eq!(total, records.len());
        for set in &regions {
            assert!(set.chunks.iter().all(|c| c.coord.region() == set.region));
        }
    }

    #[test]
    fn test_empty_input() {
        assert!(group_regions(&[]).is_empty());
    }
}
