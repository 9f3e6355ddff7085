/// Deliver `total` zero samples to `emit` in slices of at most `silence.len()`.
///
/// `silence` is preallocated by the caller, so nothing here allocates.
pub(crate) fn feed_silence(silence: &[f32], total: usize, mut emit: impl FnMut(&[f32])) {
    if silence.is_empty() {
        return;
    }
    let mut remaining = total;
    while remaining > 0 {
        let n = remaining.min(silence.len());
        emit(&silence[..n]);
        remaining -= n;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_within_buffer_is_one_slice() {
        let silence = [0.0f32; 960];
        let mut lengths = Vec::new();
        feed_silence(&silence, 480, |chunk| lengths.push(chunk.len()));
        assert_eq!(lengths, vec![480]);
    }

    #[test]
    fn oversized_packet_is_chunked_without_growing() {
        let silence = [0.0f32; 960];
        let mut lengths = Vec::new();
        feed_silence(&silence, 2_000, |chunk| {
            assert!(chunk.iter().all(|&s| s == 0.0));
            lengths.push(chunk.len());
        });
        assert_eq!(lengths, vec![960, 960, 80]);
    }

    #[test]
    fn empty_buffer_emits_nothing() {
        let mut calls = 0;
        feed_silence(&[], 100, |_| calls += 1);
        assert_eq!(calls, 0);
    }
}
