use crate::error::RecordSourceError;
use crate::PhotoRecord;

/// Read-only, stable-indexed view of the photo collection for one session.
///
/// Indices are stable while a snapshot is alive: no inserts or removals
/// mid-window. Append-only hosts swap in a fresh snapshot and re-run the
/// initial materialization.
pub trait RecordSource {
    fn count(&self) -> usize;

    fn record(&self, index: usize) -> Result<PhotoRecord, RecordSourceError>;
}

/// In-memory snapshot source, the common case for hosts that query their
/// photo store once per view.
#[derive(Debug, Default)]
pub struct VecSource {
    records: Vec<PhotoRecord>,
}

impl VecSource {
    pub fn new(records: Vec<PhotoRecord>) -> Self {
        Self { records }
    }
}

impl RecordSource for VecSource {
    fn count(&self) -> usize {
        self.records.len()
    }

    fn record(&self, index: usize) -> Result<PhotoRecord, RecordSourceError> {
        self.records
            .get(index)
            .cloned()
            .ok_or(RecordSourceError::OutOfBounds {
                index,
                count: self.records.len(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn record(id: i64) -> PhotoRecord {
        PhotoRecord {
            id,
            filename: format!("img_{id:04}.jpg"),
            filepath: PathBuf::from(format!("/photos/img_{id:04}.jpg")),
            thumbnail_path: None,
            width: 4000,
            height: 3000,
            rating: 0,
            is_favorite: false,
        }
    }

    #[test]
    fn out_of_bounds_is_an_error() {
        let source = VecSource::new(vec![record(1), record(2)]);
        assert_eq!(source.count(), 2);
        assert!(source.record(1).is_ok());
        assert!(matches!(
            source.record(2),
            Err(RecordSourceError::OutOfBounds { index: 2, count: 2 })
        ));
    }
}
