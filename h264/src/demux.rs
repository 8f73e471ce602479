use crate::{
    bits::{strip_emulation_prevention, BitReader},
    nal::NalType,
    sps::{self, Sps},
};

/// One reassembled Access Unit: a complete set of NAL units that decode
/// to a single picture, each re-framed with a four-byte Annex-B start
/// code, with AUD and SEI units dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Annex-B framed bytes: `00 00 00 01` followed by NAL payload, for
    /// each retained NAL unit, concatenated in arrival order.
    pub bytes: Vec<u8>,
    /// Whether this Access Unit contains an IDR (type 5) slice.
    pub is_keyframe: bool,
}

/// Result of one [`Demuxer::feed`] call.
#[derive(Debug, Clone, Default)]
pub struct FeedResult {
    /// Access Units completed during this call, in arrival order.
    pub frames: Vec<Frame>,
    /// The most recent SPS observed during this call, parsed for
    /// dimensions and codec identity.
    pub sps: Option<Sps>,
    /// The most recent PPS observed during this call, as raw NAL bytes
    /// (header byte included).
    pub pps: Option<Vec<u8>>,
}

const START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

/// Incremental Annex-B demuxer.
///
/// A NAL unit is only recognized once both its own start code and a
/// following one have arrived — bytes after the last start code seen so
/// far are always carried to the next [`feed`](Self::feed) call, so
/// splitting a stream at an arbitrary byte offset never changes the
/// Access Units produced. Once a complete Access Unit (one containing a
/// VCL NAL) has accumulated, it is flushed at the end of the current
/// call even if the NAL that would normally trigger the boundary rule
/// hasn't arrived yet, so a live stream doesn't sit one message behind.
#[derive(Debug, Default)]
pub struct Demuxer {
    carry: Vec<u8>,
    pending: Vec<Vec<u8>>,
    pending_has_vcl: bool,
}

impl Demuxer {
    /// Creates an empty demuxer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds the next chunk of the Annex-B byte stream, returning any
    /// Access Units completed as a result.
    pub fn feed(&mut self, chunk: &[u8]) -> FeedResult {
        self.carry.extend_from_slice(chunk);

        let starts = find_start_codes(&self.carry);
        let mut result = FeedResult::default();

        // Only NAL units bounded by two start codes are usable here;
        // the tail after the last start code might still be growing.
        let nals: Vec<Vec<u8>> = starts
            .windows(2)
            .map(|w| {
                let (_, payload_start) = w[0];
                let (next_begin, _) = w[1];
                self.carry[payload_start..next_begin].to_vec()
            })
            .collect();

        // Keep only the tail from the last start code onward; everything
        // before it (leading garbage plus every NAL just processed) is done.
        if let Some(&(last_begin, _)) = starts.last() {
            self.carry.drain(..last_begin);
        }

        for nal in &nals {
            self.process_nal(nal, &mut result);
        }

        // A live stream keeps producing NALs, so a complete Access Unit
        // (pending already holds a VCL) doesn't need to wait for its
        // official boundary NAL to itself be closed out by a further
        // start code before being handed to the caller.
        if self.pending_has_vcl {
            self.flush_pending(&mut result);
        }

        result
    }

    fn process_nal(&mut self, nal: &[u8], result: &mut FeedResult) {
        if nal.is_empty() {
            return;
        }
        let nal_type = NalType::from_header(nal[0]);

        if nal_type == NalType::Sps {
            result.sps = sps::parse(nal);
        }
        if nal_type == NalType::Pps {
            result.pps = Some(nal.to_vec());
        }

        let is_boundary = self.pending_has_vcl
            && (!nal_type.is_vcl() || first_mb_in_slice(nal) == Some(0));
        if is_boundary {
            self.flush_pending(result);
        }

        if nal_type.is_vcl() {
            self.pending_has_vcl = true;
        }
        self.pending.push(nal.to_vec());
    }

    fn flush_pending(&mut self, result: &mut FeedResult) {
        if self.pending.is_empty() {
            return;
        }
        let mut bytes = Vec::new();
        let mut is_keyframe = false;
        for nal in self.pending.drain(..) {
            match NalType::from_header(nal[0]) {
                NalType::Aud | NalType::Sei => continue,
                NalType::IdrSlice => is_keyframe = true,
                _ => {}
            }
            bytes.extend_from_slice(&START_CODE);
            bytes.extend_from_slice(&nal);
        }
        self.pending_has_vcl = false;
        if !bytes.is_empty() {
            result.frames.push(Frame { bytes, is_keyframe });
        }
    }
}

/// Finds every Annex-B start code in `buf`, returning `(start_code_begin,
/// payload_start)` pairs in order. `start_code_begin` is the index of the
/// first byte that belongs to the start code (absorbing the optional
/// fourth leading zero byte); `payload_start` is the index right after it.
fn find_start_codes(buf: &[u8]) -> Vec<(usize, usize)> {
    let mut starts = Vec::new();
    let mut i = 0;
    while i + 3 <= buf.len() {
        if buf[i] == 0 && buf[i + 1] == 0 && buf[i + 2] == 1 {
            let begin = if i > 0 && buf[i - 1] == 0 { i - 1 } else { i };
            starts.push((begin, i + 3));
            i += 3;
        } else {
            i += 1;
        }
    }
    starts
}

/// Reads `first_mb_in_slice` from a VCL NAL's slice header.
fn first_mb_in_slice(nal: &[u8]) -> Option<u32> {
    if nal.len() < 2 {
        return None;
    }
    let rbsp = strip_emulation_prevention(&nal[1..]);
    BitReader::new(&rbsp).read_ue()
}

#[cfg(test)]
mod tests {
    use super::*;

    // SPS, PPS, IDR slice with first_mb_in_slice=0.
    const SPS: [u8; 9] = [0x67, 0x42, 0xc0, 0x1f, 0xf4, 0x02, 0x80, 0x2d, 0xd0];
    const PPS: [u8; 4] = [0x68, 0xce, 0x3c, 0x80];
    // NAL header (0x65 = IDR) followed by slice header starting with
    // first_mb_in_slice=0, encoded as ue(0) = a single `1` bit: 0x80 = 1000_0000.
    const IDR: [u8; 3] = [0x65, 0x80, 0x00];
    // Non-IDR slice (type 1), same slice header shape.
    const NON_IDR: [u8; 3] = [0x41, 0x80, 0x00];
    // Access unit delimiter, used here purely as a trailing NAL that
    // closes out the preceding one with its own start code.
    const AUD: [u8; 2] = [0x09, 0xf0];

    fn framed(nals: &[&[u8]]) -> Vec<u8> {
        let mut stream = Vec::new();
        for nal in nals {
            stream.extend_from_slice(&START_CODE);
            stream.extend_from_slice(nal);
        }
        stream
    }

    /// One keyframe message followed by the start of the next one (an
    /// AUD), so the IDR is bounded within a single `feed()` call — the
    /// way a live stream actually presents it.
    fn build_stream() -> Vec<u8> {
        framed(&[&SPS, &PPS, &IDR, &AUD])
    }

    #[test]
    fn assembles_one_access_unit_from_sps_pps_idr() {
        let mut demuxer = Demuxer::new();
        let result = demuxer.feed(&build_stream());
        assert_eq!(result.frames.len(), 1);
        let frame = &result.frames[0];
        assert!(frame.is_keyframe);
        assert!(result.sps.is_some());
        assert_eq!(result.sps.as_ref().unwrap().width, 1280);
        assert_eq!(result.pps, Some(PPS.to_vec()));

        let expected_len = 4 * 3 + SPS.len() + PPS.len() + IDR.len();
        assert_eq!(frame.bytes.len(), expected_len);
    }

    #[test]
    fn split_at_every_byte_offset_yields_the_same_access_unit() {
        let stream = build_stream();
        let whole = {
            let mut demuxer = Demuxer::new();
            demuxer.feed(&stream).frames
        };
        assert_eq!(whole.len(), 1);

        for split in 0..=stream.len() {
            let (prefix, suffix) = stream.split_at(split);
            let mut demuxer = Demuxer::new();
            let mut frames = demuxer.feed(prefix).frames;
            frames.extend(demuxer.feed(suffix).frames);
            assert_eq!(frames, whole, "split at byte {split} produced a different Access Unit");
        }
    }

    #[test]
    fn feed_then_feed_equals_feed_concatenated() {
        let stream = build_stream();
        let mut repeated = stream.clone();
        repeated.extend_from_slice(&stream);

        let mid = repeated.len() / 2;
        let (first, second) = repeated.split_at(mid);

        let mut incremental = Demuxer::new();
        let mut frames = incremental.feed(first).frames;
        frames.extend(incremental.feed(second).frames);

        let mut one_shot = Demuxer::new();
        let one_shot_frames = one_shot.feed(&repeated).frames;

        assert_eq!(frames, one_shot_frames);
        assert_eq!(frames.len(), 2);
    }

    #[test]
    fn drops_aud_and_sei_from_emitted_access_units() {
        let sei: [u8; 3] = [0x06, 0x01, 0x00];
        let stream = framed(&[&AUD, &sei, &SPS, &PPS, &IDR, &AUD]);

        let mut demuxer = Demuxer::new();
        let result = demuxer.feed(&stream);
        assert_eq!(result.frames.len(), 1);
        let expected_len = 4 * 3 + SPS.len() + PPS.len() + IDR.len();
        assert_eq!(result.frames[0].bytes.len(), expected_len);
    }

    #[test]
    fn non_idr_slice_is_not_classified_as_keyframe() {
        let stream = framed(&[&SPS, &PPS, &NON_IDR, &AUD]);

        let mut demuxer = Demuxer::new();
        let result = demuxer.feed(&stream);
        assert_eq!(result.frames.len(), 1);
        assert!(!result.frames[0].is_keyframe);
    }

    #[test]
    fn incomplete_trailing_nal_is_carried_to_the_next_call() {
        let stream = framed(&[&NON_IDR]);
        let (first, second) = stream.split_at(2); // splits inside the start code

        let mut demuxer = Demuxer::new();
        assert!(demuxer.feed(first).frames.is_empty());
        // No closing start code has arrived yet, so nothing is emitted.
        assert!(demuxer.feed(second).frames.is_empty());

        // Only once a following NAL's start code arrives is the slice
        // bounded and the pending VCL accumulation flushed.
        let result = demuxer.feed(&framed(&[&AUD]));
        assert_eq!(result.frames.len(), 1);
        assert!(!result.frames[0].is_keyframe);
    }

    #[test]
    fn leading_garbage_before_first_start_code_is_dropped() {
        let mut stream = vec![0xde, 0xad, 0xbe, 0xef];
        stream.extend_from_slice(&framed(&[&NON_IDR, &AUD]));

        let mut demuxer = Demuxer::new();
        let result = demuxer.feed(&stream);
        assert_eq!(result.frames.len(), 1);
        assert_eq!(result.frames[0].bytes, framed(&[&NON_IDR]));
    }
}
