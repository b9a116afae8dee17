//! A sortable view over one document's bucket, without owning the bucket bytes.
//!
//! The bucket buffer for a band is built once (by the read phase) and never
//! moved afterward; sorting only permutes `Element::ordinal`. The comparator
//! closes over an immutable slice reference rather than reaching through
//! thread-shared mutable statics, so it composes cleanly with `rayon`'s
//! parallel sort.

/// One document's position in the shared bucket buffer for the current band.
#[derive(Clone, Copy, Debug)]
pub struct Element {
    pub ordinal: u64,
}

/// Borrowed view of the flat per-band bucket buffer, used to build comparators.
#[derive(Clone, Copy)]
pub struct BucketView<'a> {
    buf: &'a [u8],
    bytes_per_bucket: usize,
}

impl<'a> BucketView<'a> {
    pub fn new(buf: &'a [u8], bytes_per_bucket: usize) -> Self {
        assert_eq!(buf.len() % bytes_per_bucket, 0, "buffer length must be a multiple of bucket width");
        Self { buf, bytes_per_bucket }
    }

    #[inline]
    pub fn bucket(&self, ordinal: u64) -> &'a [u8] {
        let start = ordinal as usize * self.bytes_per_bucket;
        &self.buf[start..start + self.bytes_per_bucket]
    }

    #[inline]
    pub fn bytes_per_bucket(&self) -> usize {
        self.bytes_per_bucket
    }

    #[inline]
    pub fn num_items(&self) -> usize {
        self.buf.len() / self.bytes_per_bucket
    }

    /// Split key used to shard index output: the bucket's last byte.
    #[inline]
    pub fn split_of(&self, ordinal: u64) -> u8 {
        let b = self.bucket(ordinal);
        b[b.len() - 1]
    }
}

/// Comparator for ascending mode: bucket bytes ascending, ties broken by
/// ascending ordinal (the minimum ordinal in a tied run is the survivor).
pub fn compare_ascending(view: BucketView<'_>, a: &Element, b: &Element) -> std::cmp::Ordering {
    view.bucket(a.ordinal)
        .cmp(view.bucket(b.ordinal))
        .then_with(|| a.ordinal.cmp(&b.ordinal))
}

/// Comparator for descending (reverse) mode: bucket bytes still ascending,
/// ties broken by descending ordinal (the maximum ordinal is the survivor).
pub fn compare_descending(view: BucketView<'_>, a: &Element, b: &Element) -> std::cmp::Ordering {
    view.bucket(a.ordinal)
        .cmp(view.bucket(b.ordinal))
        .then_with(|| b.ordinal.cmp(&a.ordinal))
}

/// Bucket-bytes-only equality, ignoring ordinal.
#[inline]
pub fn buckets_equal(view: BucketView<'_>, a: &Element, b: &Element) -> bool {
    view.bucket(a.ordinal) == view.bucket(b.ordinal)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buf(buckets: &[&[u8]]) -> Vec<u8> {
        buckets.iter().flat_map(|b| b.iter().copied()).collect()
    }

    #[test]
    fn ascending_orders_by_bytes_then_ordinal() {
        let data = buf(&[&[0, 2], &[0, 1], &[0, 1]]);
        let view = BucketView::new(&data, 2);
        let mut elems = vec![Element { ordinal: 0 }, Element { ordinal: 1 }, Element { ordinal: 2 }];
        elems.sort_by(|a, b| compare_ascending(view, a, b));
        let ords: Vec<u64> = elems.iter().map(|e| e.ordinal).collect();
        assert_eq!(ords, vec![1, 2, 0]);
    }

    #[test]
    fn descending_tiebreak_picks_max_ordinal_first() {
        let data = buf(&[&[0, 1], &[0, 1]]);
        let view = BucketView::new(&data, 2);
        let mut elems = vec![Element { ordinal: 0 }, Element { ordinal: 1 }];
        elems.sort_by(|a, b| compare_descending(view, a, b));
        assert_eq!(elems[0].ordinal, 1);
        assert_eq!(elems[1].ordinal, 0);
    }

    #[test]
    fn split_of_is_last_byte() {
        let data = buf(&[&[0xAB, 0xCD, 0xEF]]);
        let view = BucketView::new(&data, 3);
        assert_eq!(view.split_of(0), 0xEF);
    }
}
