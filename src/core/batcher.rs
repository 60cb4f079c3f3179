use crate::domain::model::{Batch, NormalizedRecord};
use crate::utils::error::{ImportError, Result};

pub const DEFAULT_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone, Copy)]
pub struct Batcher {
    size: usize,
}

impl Batcher {
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(ImportError::InvalidConfigValueError {
                field: "import.batch_size".to_string(),
                value: size.to_string(),
                reason: "Batch size must be at least 1".to_string(),
            });
        }
        Ok(Self { size })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn batch_count(&self, records: usize) -> usize {
        records.div_ceil(self.size)
    }

    /// Consecutive slices in input order; only the last may be short.
    pub fn partition(&self, records: Vec<NormalizedRecord>) -> Vec<Batch> {
        let mut batches = Vec::with_capacity(self.batch_count(records.len()));
        let mut records = records.into_iter().peekable();
        while records.peek().is_some() {
            batches.push(Batch {
                number: batches.len() + 1,
                records: records.by_ref().take(self.size).collect(),
            });
        }
        batches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::NaturalKey;

    fn records(n: usize) -> Vec<NormalizedRecord> {
        (1..=n)
            .map(|row| NormalizedRecord {
                file: None,
                row,
                key: NaturalKey::parse(&format!("K{}", row)).unwrap(),
                fields: vec![],
                dependents: vec![],
            })
            .collect()
    }

    #[test]
    fn test_partition_sizes_and_order() {
        let batcher = Batcher::new(50).unwrap();
        let input = records(149);
        let batches = batcher.partition(input.clone());

        assert_eq!(batches.len(), 3);
        assert_eq!(batcher.batch_count(149), 3);
        let sizes: Vec<usize> = batches.iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![50, 50, 49]);
        let numbers: Vec<usize> = batches.iter().map(|b| b.number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);

        let rejoined: Vec<NormalizedRecord> =
            batches.into_iter().flat_map(|b| b.records).collect();
        assert_eq!(rejoined, input);
    }

    #[test]
    fn test_exact_multiple_and_empty_input() {
        let batcher = Batcher::new(5).unwrap();
        assert_eq!(batcher.partition(records(10)).len(), 2);
        assert!(batcher.partition(Vec::new()).is_empty());
        assert_eq!(batcher.batch_count(0), 0);
    }

    #[test]
    fn test_zero_size_rejected() {
        assert!(Batcher::new(0).is_err());
    }
}
