use std::ops::{Bound, RangeBounds};

use crate::error::Result;

/// Abstract storage engine interface (byte-level operations)
///
/// Keys are kept in lexicographical order. Different from
/// sql::engine::Engine which operates on tables.
pub trait Engine {
    type EngineIterator<'a>: EngineIterator
    where
        Self: 'a;

    fn set(&mut self, key: &[u8], value: Vec<u8>) -> Result<()>;
    fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>>;
    /// Deletes a key, or does nothing if it does not exist.
    fn delete(&mut self, key: &[u8]) -> Result<()>;
    fn scan(&mut self, range: impl RangeBounds<Vec<u8>>) -> Self::EngineIterator<'_>;

    /// Prefix scan using lexicographic ordering
    ///
    /// Converts prefix scan to range scan by incrementing the last byte that
    /// is not 0xff. For example, prefix "apple" becomes range ["apple", "applf").
    fn scan_prefix(&mut self, prefix: &[u8]) -> Self::EngineIterator<'_> {
        self.scan(prefix_range(prefix))
    }
}

/// Storage engine iterator trait (supports reverse traversal)
pub trait EngineIterator: DoubleEndedIterator<Item = Result<(Vec<u8>, Vec<u8>)>> {}

/// Returns the key range covering every key starting with prefix.
pub fn prefix_range(prefix: &[u8]) -> (Bound<Vec<u8>>, Bound<Vec<u8>>) {
    let start = Bound::Included(prefix.to_vec());
    let end = match prefix.iter().rposition(|b| *b != 0xff) {
        Some(i) => {
            let mut bound = prefix[..=i].to_vec();
            bound[i] += 1;
            Bound::Excluded(bound)
        }
        None => Bound::Unbounded,
    };
    (start, end)
}

#[cfg(test)]
mod tests {
    use super::{Engine, prefix_range};
    use crate::{error::Result, storage::memory::MemoryEngine};
    use std::ops::Bound;

    fn test_point_opt(mut eng: impl Engine) -> Result<()> {
        assert_eq!(eng.get(b"students/1")?, None);

        eng.set(b"students/1", b"Alice".to_vec())?;
        assert_eq!(eng.get(b"students/1")?, Some(b"Alice".to_vec()));

        eng.set(b"students/1", b"Bob".to_vec())?;
        assert_eq!(eng.get(b"students/1")?, Some(b"Bob".to_vec()));

        eng.delete(b"students/1")?;
        assert_eq!(eng.get(b"students/1")?, None);
        eng.delete(b"students/1")?;

        eng.set(b"", vec![])?;
        assert_eq!(eng.get(b"")?, Some(vec![]));
        Ok(())
    }

    fn test_scan(mut eng: impl Engine) -> Result<()> {
        eng.set(b"grades/2", b"Math 78".to_vec())?;
        eng.set(b"grades/1", b"Math 85".to_vec())?;
        eng.set(b"students/1", b"Alice".to_vec())?;
        eng.set(b"grades/3", b"Math 92".to_vec())?;
        eng.set(b"zz", b"tail".to_vec())?;

        let mut iter = eng.scan((
            Bound::Included(b"grades/".to_vec()),
            Bound::Excluded(b"grades/3".to_vec()),
        ));
        assert_eq!(iter.next().transpose()?.map(|(k, _)| k), Some(b"grades/1".to_vec()));
        assert_eq!(iter.next().transpose()?.map(|(k, _)| k), Some(b"grades/2".to_vec()));
        assert!(iter.next().is_none());
        drop(iter);

        let mut iter = eng.scan(b"g".to_vec()..b"t".to_vec());
        let (key, value) = iter.next_back().transpose()?.expect("no value found");
        assert_eq!(key, b"students/1".to_vec());
        assert_eq!(value, b"Alice".to_vec());
        let (key, _) = iter.next_back().transpose()?.expect("no value found");
        assert_eq!(key, b"grades/3".to_vec());
        Ok(())
    }

    fn test_scan_prefix(mut eng: impl Engine) -> Result<()> {
        eng.set(b"grades/1", b"Math 85".to_vec())?;
        eng.set(b"grade", b"not a row".to_vec())?;
        eng.set(b"grades/2", b"Math 78".to_vec())?;
        eng.set(b"students/1", b"Alice".to_vec())?;

        let keys = eng
            .scan_prefix(b"grades/")
            .map(|r| r.map(|(k, _)| k))
            .collect::<Result<Vec<_>>>()?;
        assert_eq!(keys, vec![b"grades/1".to_vec(), b"grades/2".to_vec()]);

        eng.set(&[0x01, 0xff, 0xff], b"edge".to_vec())?;
        eng.set(&[0x02], b"next".to_vec())?;
        let keys = eng
            .scan_prefix(&[0x01, 0xff])
            .map(|r| r.map(|(k, _)| k))
            .collect::<Result<Vec<_>>>()?;
        assert_eq!(keys, vec![vec![0x01, 0xff, 0xff]]);
        Ok(())
    }

    #[test]
    fn test_prefix_range() {
        assert_eq!(
            prefix_range(b"ab"),
            (Bound::Included(b"ab".to_vec()), Bound::Excluded(b"ac".to_vec()))
        );
        assert_eq!(
            prefix_range(&[0x01, 0xff]),
            (Bound::Included(vec![0x01, 0xff]), Bound::Excluded(vec![0x02]))
        );
        assert_eq!(prefix_range(&[0xff]), (Bound::Included(vec![0xff]), Bound::Unbounded));
    }

    #[test]
    fn test_memory() -> Result<()> {
        test_point_opt(MemoryEngine::new())?;
        test_scan(MemoryEngine::new())?;
        test_scan_prefix(MemoryEngine::new())?;
        Ok(())
    }
}
