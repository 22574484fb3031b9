//! Ring buffers: chunked circular stores for face crops, scores,
//! and timestamps, plus the crop preprocessing contract and crop-rect
//! derivation formula they depend on.

use vclip_models::NormalizedRect;

use super::config::RingBufferConfig;
use super::face_processor::Frame;

/// A fixed-length circular store of `length` logical chunks, with
/// `front_padding` chunks of grace history behind the window and
/// `back_padding` chunks of slack absorbing writes between wraps.
///
/// Reads beyond the `length`-chunk logical window but within
/// `front_padding` may still return genuinely preserved history; reads at or
/// beyond `-(front_padding + length)` always return the configured fill
/// value, by construction — this is the buffer's hard addressable boundary.
#[derive(Debug, Clone)]
pub struct ChunkedRingBuffer<T: Clone> {
    chunks: Vec<T>,
    length: usize,
    front_padding: usize,
    back_padding: usize,
    write_index: usize,
    fill: T,
    writes_so_far: usize,
}

impl<T: Clone> ChunkedRingBuffer<T> {
    pub fn new(length: usize, front_padding: usize, back_padding: usize, fill: T) -> Self {
        let capacity = front_padding + length + back_padding;
        Self {
            chunks: vec![fill.clone(); capacity],
            length,
            front_padding,
            back_padding,
            write_index: front_padding,
            fill,
            writes_so_far: 0,
        }
    }

    fn capacity(&self) -> usize {
        self.front_padding + self.length + self.back_padding
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// Append one chunk, performing the bounded memmove wrap when the
    /// physical buffer is full.
    pub fn write(&mut self, value: T) {
        if self.write_index == self.capacity() {
            let window = self.front_padding + self.length;
            let start = self.capacity() - window;
            for i in 0..window {
                self.chunks[i] = self.chunks[start + i].clone();
            }
            self.write_index = window;
        }
        self.chunks[self.write_index] = value;
        self.write_index += 1;
        self.writes_so_far += 1;
    }

    /// Overwrite the chunk currently at negative index `-k` without
    /// advancing the write cursor. `k` must address an already-written
    /// cell (`1 <= k <= min(writes_so_far, front_padding + length - 1)`).
    pub fn write_in_place(&mut self, k: usize, value: T) {
        assert!(k >= 1, "in-place write index must be >= 1");
        let pos = self.write_index as isize - k as isize;
        if pos >= 0 {
            self.chunks[pos as usize] = value;
        }
    }

    /// Read the chunk at negative index `-k` (`k >= 1`).
    pub fn read(&self, k: usize) -> T {
        assert!(k >= 1, "ring buffer read index magnitude must be >= 1");
        if k >= self.front_padding + self.length {
            return self.fill.clone();
        }
        if k > self.writes_so_far {
            return self.fill.clone();
        }
        let pos = self.write_index as isize - k as isize;
        if pos < 0 {
            return self.fill.clone();
        }
        self.chunks[pos as usize].clone()
    }

    /// The `length` most recent chunks, oldest first.
    pub fn window(&self) -> Vec<T> {
        (1..=self.length).rev().map(|k| self.read(k)).collect()
    }
}

/// Axis-aligned rectangle in source-frame pixel coordinates, possibly
/// extending outside the frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Derive the square crop rect for a detection/track rect:
/// `bs = max(w*frame.w, h*frame.h) / 2`, `side = bs * (1 + cs)`, centered on
/// the box midpoint and shifted down by `bs*cs` to bias toward the head.
pub fn derive_crop_rect(rect: &NormalizedRect, frame_w: f64, frame_h: f64, crop_scale: f64) -> PixelRect {
    let bs = (rect.width * frame_w).max(rect.height * frame_h) / 2.0;
    let side = bs * (1.0 + crop_scale);
    let cx = rect.mid_x() * frame_w;
    let cy = rect.mid_y() * frame_h - bs * crop_scale;
    PixelRect {
        x: cx - side / 2.0,
        y: cy - side / 2.0,
        width: side,
        height: side,
    }
}

/// ITU-R BT.601 luma weights.
const LUMA_R: f32 = 0.299;
const LUMA_G: f32 = 0.587;
const LUMA_B: f32 = 0.114;

/// Preprocess a (possibly partially out-of-frame) crop rect from `frame`
/// into a `target x target` float32 luma buffer in `[0,1]`, per the
/// `preprocess_face` contract: pad with neutral gray, resample, then
/// convert to BT.601 luma scaled to `[0,1]`.
pub fn preprocess_face(frame: &Frame, crop_rect: &PixelRect, target: usize, fill_value: f32) -> Vec<f32> {
    let crop_w = crop_rect.width.round().max(1.0) as usize;
    let crop_h = crop_rect.height.round().max(1.0) as usize;

    // Step 1-2: intermediate RGB buffer filled with neutral gray, with the
    // frame/crop intersection copied in.
    let mut intermediate = vec![fill_value.clamp(0.0, 255.0) as u8; crop_w * crop_h * 3];
    let fw = frame.width as i64;
    let fh = frame.height as i64;
    let rx0 = crop_rect.x.floor() as i64;
    let ry0 = crop_rect.y.floor() as i64;

    for dy in 0..crop_h as i64 {
        let sy = ry0 + dy;
        if sy < 0 || sy >= fh {
            continue;
        }
        for dx in 0..crop_w as i64 {
            let sx = rx0 + dx;
            if sx < 0 || sx >= fw {
                continue;
            }
            let src_idx = ((sy * fw + sx) * 4) as usize;
            if src_idx + 2 >= frame.pixels.len() {
                continue;
            }
            let dst_idx = ((dy as usize) * crop_w + dx as usize) * 3;
            intermediate[dst_idx] = frame.pixels[src_idx];
            intermediate[dst_idx + 1] = frame.pixels[src_idx + 1];
            intermediate[dst_idx + 2] = frame.pixels[src_idx + 2];
        }
    }

    // Step 3: bilinear resample to target x target.
    let mut resampled = vec![0u8; target * target * 3];
    for ty in 0..target {
        for tx in 0..target {
            let src_x = if target > 1 {
                tx as f64 * (crop_w.saturating_sub(1)) as f64 / (target - 1) as f64
            } else {
                0.0
            };
            let src_y = if target > 1 {
                ty as f64 * (crop_h.saturating_sub(1)) as f64 / (target - 1) as f64
            } else {
                0.0
            };
            let (r, g, b) = bilinear_sample(&intermediate, crop_w, crop_h, src_x, src_y);
            let dst = (ty * target + tx) * 3;
            resampled[dst] = r;
            resampled[dst + 1] = g;
            resampled[dst + 2] = b;
        }
    }

    // Step 4-5: BT.601 luma, scaled to [0,1].
    let mut out = vec![0.0f32; target * target];
    for i in 0..target * target {
        let r = resampled[i * 3] as f32;
        let g = resampled[i * 3 + 1] as f32;
        let b = resampled[i * 3 + 2] as f32;
        let luma = LUMA_R * r + LUMA_G * g + LUMA_B * b;
        out[i] = luma / 255.0;
    }
    out
}

fn bilinear_sample(buf: &[u8], w: usize, h: usize, x: f64, y: f64) -> (u8, u8, u8) {
    if w == 0 || h == 0 {
        return (0, 0, 0);
    }
    let x0 = x.floor().clamp(0.0, (w - 1) as f64) as usize;
    let y0 = y.floor().clamp(0.0, (h - 1) as f64) as usize;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    let px = |xx: usize, yy: usize, c: usize| buf[(yy * w + xx) * 3 + c] as f64;

    let mut out = [0u8; 3];
    for c in 0..3 {
        let top = px(x0, y0, c) * (1.0 - fx) + px(x1, y0, c) * fx;
        let bottom = px(x0, y1, c) * (1.0 - fx) + px(x1, y1, c) * fx;
        let value = top * (1.0 - fy) + bottom * fy;
        out[c] = value.round().clamp(0.0, 255.0) as u8;
    }
    (out[0], out[1], out[2])
}

/// Per-track crop window store. Chunk = one preprocessed `H x W` luma crop.
#[derive(Debug, Clone)]
pub struct CropBuffer {
    inner: ChunkedRingBuffer<Vec<f32>>,
    config: RingBufferConfig,
    last_crop_rect: Option<PixelRect>,
}

impl CropBuffer {
    pub fn new(config: RingBufferConfig) -> Self {
        let frame_size = config.asd_frame_size;
        let fill = vec![config.fill_value / 255.0; frame_size * frame_size];
        Self {
            inner: ChunkedRingBuffer::new(config.asd_video_length, config.front_padding, config.back_padding, fill),
            config,
            last_crop_rect: None,
        }
    }

    /// Compute the crop rect, preprocess, and push a new chunk.
    pub fn write(&mut self, frame: &Frame, track_rect: &NormalizedRect) {
        let crop_rect = derive_crop_rect(
            track_rect,
            frame.width as f64,
            frame.height as f64,
            self.config.asd_crop_padding,
        );
        let chunk = preprocess_face(frame, &crop_rect, self.config.asd_frame_size, self.config.fill_value);
        self.inner.write(chunk);
        self.last_crop_rect = Some(crop_rect);
    }

    /// Update the crop-rect metadata only, without preprocessing or
    /// advancing the ring (`skip = true` in `updateTracksAndGetFrames`).
    pub fn mark_crop_rect_only(&mut self, frame_w: f64, frame_h: f64, track_rect: &NormalizedRect) {
        self.last_crop_rect = Some(derive_crop_rect(track_rect, frame_w, frame_h, self.config.asd_crop_padding));
    }

    pub fn last_crop_rect(&self) -> Option<PixelRect> {
        self.last_crop_rect
    }

    /// The `asdVideoLength`-chunk crop window, oldest first.
    pub fn window(&self) -> Vec<Vec<f32>> {
        self.inner.window()
    }
}

/// Per-track classifier score store. Chunk = single float32.
#[derive(Debug, Clone)]
pub struct ScoreBuffer {
    inner: ChunkedRingBuffer<f32>,
}

impl ScoreBuffer {
    pub fn new(config: RingBufferConfig) -> Self {
        Self {
            inner: ChunkedRingBuffer::new(config.asd_video_length, config.front_padding, config.back_padding, 0.0),
        }
    }

    /// Write a classifier score vector: the last `count` scalars become
    /// fresh ring cells; the earlier scalars overwrite the already-existing
    /// most-recent cells in place (overwrite, not average — resolved as
    /// overwrite by this implementation; see DESIGN.md for the rationale).
    pub fn write(&mut self, scores: &[f32], count: usize) {
        assert!(count <= scores.len(), "count must not exceed the score vector length");
        let existing = scores.len() - count;
        for (i, &value) in scores[..existing].iter().enumerate() {
            let k = existing - i;
            self.inner.write_in_place(k, value);
        }
        for &value in &scores[existing..] {
            self.inner.write(value);
        }
    }

    /// Most recent score, or `None` if nothing has been written yet.
    pub fn last_score(&self) -> Option<f32> {
        let score = self.inner.read(1);
        if score == 0.0 {
            None
        } else {
            Some(score)
        }
    }
}

/// Non-chunked circular store of write timestamps, parallel to a ring
/// buffer's chunk indices.
#[derive(Debug, Clone)]
pub struct TimestampBuffer {
    inner: ChunkedRingBuffer<f64>,
    last_write_time: f64,
}

impl TimestampBuffer {
    pub fn new(length: usize, front_padding: usize, back_padding: usize) -> Self {
        Self {
            inner: ChunkedRingBuffer::new(length, front_padding, back_padding, f64::NEG_INFINITY),
            last_write_time: f64::NEG_INFINITY,
        }
    }

    pub fn last_write_time(&self) -> f64 {
        self.last_write_time
    }

    /// Insert `count` timestamps linearly interpolated strictly between the
    /// previous `lastWriteTime` and `t`, so the last written cell equals `t`.
    pub fn write(&mut self, t: f64, count: usize) {
        let prev = self.last_write_time;
        let base = if prev.is_finite() { prev } else { t };
        for i in 1..=count {
            let frac = i as f64 / count as f64;
            self.inner.write(base + frac * (t - base));
        }
        self.last_write_time = t;
    }

    /// Nearest chunk index (as a negative magnitude `k`, i.e. `-1, -2, ...`)
    /// to timestamp `t` within the live window.
    pub fn index_of(&self, t: f64) -> isize {
        let max_k = self.inner.length(); // search the logical window
        let mut best_k = 1usize;
        let mut best_diff = f64::INFINITY;
        for k in 1..=max_k {
            let candidate = self.inner.read(k);
            if !candidate.is_finite() {
                continue;
            }
            let diff = (candidate - t).abs();
            if diff < best_diff {
                best_diff = diff;
                best_k = k;
            }
        }
        -(best_k as isize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_write_round_trips_recent_chunks() {
        let mut buf = ChunkedRingBuffer::new(25, 3, 25, -1.0f32);
        for i in 0..10 {
            buf.write(i as f32);
        }
        assert_eq!(buf.read(1), 9.0);
        assert_eq!(buf.read(10), 0.0);
        assert_eq!(buf.read(11), -1.0); // not yet written, pad
    }

    #[test]
    fn ring_wrap_preserves_the_most_recent_window_after_many_writes() {
        let mut buf = ChunkedRingBuffer::new(25, 3, 25, -1.0f32);
        for i in 0..60 {
            buf.write(i as f32);
        }
        for k in 1..=25 {
            assert!(buf.read(k) >= 0.0, "index -{k} should be a real recent write");
        }
        assert_eq!(buf.read(28), -1.0, "index -28 must be the pad value");
    }

    #[test]
    fn timestamp_index_of_last_write_time_is_minus_one() {
        let mut ts = TimestampBuffer::new(25, 3, 25);
        ts.write(1.0, 5);
        assert_eq!(ts.index_of(ts.last_write_time()), -1);
    }

    #[test]
    fn timestamp_write_interpolates_and_ends_exactly_at_t() {
        let mut ts = TimestampBuffer::new(25, 3, 25);
        ts.write(0.0, 1);
        ts.write(5.0, 5);
        assert_eq!(ts.last_write_time(), 5.0);
        assert_eq!(ts.inner.read(1), 5.0);
    }

    #[test]
    fn score_buffer_overwrites_existing_cells_without_averaging() {
        let config = RingBufferConfig::default();
        let mut sb = ScoreBuffer::new(config);
        let first: Vec<f32> = (0..config.asd_video_length).map(|i| i as f32).collect();
        sb.write(&first, 5);
        assert_eq!(sb.last_score(), Some((config.asd_video_length - 1) as f32));

        let second: Vec<f32> = vec![100.0; config.asd_video_length];
        sb.write(&second, 5);
        assert_eq!(sb.last_score(), Some(100.0));
    }

    #[test]
    fn crop_rect_derivation_matches_formula() {
        let rect = NormalizedRect::new(0.4, 0.4, 0.2, 0.2);
        let crop = derive_crop_rect(&rect, 100.0, 100.0, 0.40);
        let bs = (0.2 * 100.0f64).max(0.2 * 100.0) / 2.0;
        let side = bs * 1.40;
        assert!((crop.width - side).abs() < 1e-9);
        assert!((crop.height - side).abs() < 1e-9);
    }
}
