use crate::error::CanvasError;

/// Byte order of one premultiplied 8-bit pixel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelOrder {
    Rgba,
    Bgra,
}

impl ChannelOrder {
    /// The order display surfaces expect.
    pub const DISPLAY: ChannelOrder = ChannelOrder::Bgra;

    /// Byte offsets of red and blue within a pixel.
    pub fn red_blue(self) -> (usize, usize) {
        match self {
            ChannelOrder::Rgba => (0, 2),
            ChannelOrder::Bgra => (2, 0),
        }
    }
}

/// Who allocated the pixels of a rendered frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferOwnership {
    /// The caller handed the buffer in and gets it back.
    CallerProvided,
    /// The backend allocated it; it lives as long as the backend's frame.
    BackendOwned,
}

/// An owned, tightly packed, premultiplied RGBA or BGRA image.
#[derive(Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    order: ChannelOrder,
    data: Vec<u8>,
}

impl std::fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("order", &self.order)
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl PixelBuffer {
    /// A transparent RGBA buffer.
    pub fn new(width: u32, height: u32) -> Result<Self, CanvasError> {
        let len = byte_len(width, height)?;
        Ok(Self {
            width,
            height,
            order: ChannelOrder::Rgba,
            data: vec![0; len],
        })
    }

    pub fn from_vec(
        width: u32,
        height: u32,
        order: ChannelOrder,
        data: Vec<u8>,
    ) -> Result<Self, CanvasError> {
        let expected = byte_len(width, height)?;
        if data.len() != expected {
            return Err(CanvasError::BufferLength {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            order,
            data,
        })
    }

    /// Wraps pixels whose length the backend already guarantees.
    pub(crate) fn from_raw(width: u32, height: u32, order: ChannelOrder, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), width as usize * height as usize * 4);
        Self {
            width,
            height,
            order,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.width as usize * 4
    }

    pub fn order(&self) -> ChannelOrder {
        self.order
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    pub fn view(&self) -> PixelView<'_> {
        PixelView {
            width: self.width,
            height: self.height,
            order: self.order,
            data: &self.data,
        }
    }

    /// Swaps red and blue in place when needed so the buffer is in
    /// [`ChannelOrder::DISPLAY`] order.
    pub fn into_display_order(self) -> Self {
        self.into_order(ChannelOrder::DISPLAY)
    }

    pub fn into_order(mut self, order: ChannelOrder) -> Self {
        if self.order != order {
            swap_red_blue(&mut self.data);
            self.order = order;
        }
        self
    }

    /// Returns the pixels in RGBA order with alpha divided out.
    pub fn to_straight_rgba(&self) -> Vec<u8> {
        let mut out = self.data.clone();
        if self.order == ChannelOrder::Bgra {
            swap_red_blue(&mut out);
        }
        for px in out.chunks_exact_mut(4) {
            let a = px[3] as u32;
            if a == 0 || a == 255 {
                continue;
            }
            for c in &mut px[..3] {
                *c = ((*c as u32 * 255 + a / 2) / a).min(255) as u8;
            }
        }
        out
    }
}

/// A borrowed view of premultiplied pixels, possibly owned by a backend.
#[derive(Clone, Copy, Debug)]
pub struct PixelView<'a> {
    width: u32,
    height: u32,
    order: ChannelOrder,
    data: &'a [u8],
}

impl<'a> PixelView<'a> {
    /// `data` must be tightly packed: `width * height * 4` bytes.
    pub fn new(width: u32, height: u32, order: ChannelOrder, data: &'a [u8]) -> Option<Self> {
        let expected = byte_len(width, height).ok()?;
        (data.len() == expected).then_some(Self {
            width,
            height,
            order,
            data,
        })
    }

    pub(crate) fn from_raw(width: u32, height: u32, order: ChannelOrder, data: &'a [u8]) -> Self {
        debug_assert_eq!(data.len(), width as usize * height as usize * 4);
        Self {
            width,
            height,
            order,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.width as usize * 4
    }

    pub fn order(&self) -> ChannelOrder {
        self.order
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Premultiplied pixel at `(x, y)` in RGBA order regardless of storage.
    pub fn rgba_at(&self, x: u32, y: u32) -> [u8; 4] {
        if x >= self.width || y >= self.height {
            return [0; 4];
        }
        let i = y as usize * self.stride() + x as usize * 4;
        let px = &self.data[i..i + 4];
        let (r, b) = self.order.red_blue();
        [px[r], px[1], px[b], px[3]]
    }

    pub fn alpha_at(&self, x: u32, y: u32) -> u8 {
        self.rgba_at(x, y)[3]
    }

    /// One flag per pixel: alpha above `threshold`.
    pub fn silhouette(&self, threshold: u8) -> Vec<bool> {
        self.data.chunks_exact(4).map(|px| px[3] > threshold).collect()
    }

    /// Number of pixels whose silhouettes disagree, or `None` when the views
    /// differ in size.
    pub fn silhouette_mismatch(&self, other: &PixelView<'_>, threshold: u8) -> Option<usize> {
        if (self.width, self.height) != (other.width, other.height) {
            return None;
        }
        let a = self.silhouette(threshold);
        let b = other.silhouette(threshold);
        Some(a.iter().zip(&b).filter(|(a, b)| a != b).count())
    }

    /// Copies the pixels out, keeping their order.
    pub fn to_buffer(&self) -> PixelBuffer {
        PixelBuffer {
            width: self.width,
            height: self.height,
            order: self.order,
            data: self.data.to_vec(),
        }
    }
}

fn byte_len(width: u32, height: u32) -> Result<usize, CanvasError> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(4))
        .filter(|&n| n > 0)
        .ok_or(CanvasError::InvalidSize { width, height })
}

fn swap_red_blue(data: &mut [u8]) {
    for px in data.chunks_exact_mut(4) {
        px.swap(0, 2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_order_swaps_channels() {
        let buffer = PixelBuffer::from_vec(1, 1, ChannelOrder::Rgba, vec![10, 20, 30, 255]).unwrap();
        let display = buffer.into_display_order();
        assert_eq!(display.order(), ChannelOrder::Bgra);
        assert_eq!(display.data(), &[30, 20, 10, 255]);
        // Reading through the view normalises back to RGBA.
        assert_eq!(display.view().rgba_at(0, 0), [10, 20, 30, 255]);
        // Already in display order: untouched.
        assert_eq!(display.clone().into_display_order(), display);
    }

    #[test]
    fn test_zero_size_is_rejected() {
        assert!(matches!(
            PixelBuffer::new(0, 10),
            Err(CanvasError::InvalidSize { width: 0, height: 10 })
        ));
        assert!(matches!(
            PixelBuffer::from_vec(2, 2, ChannelOrder::Rgba, vec![0; 3]),
            Err(CanvasError::BufferLength { expected: 16, actual: 3, .. })
        ));
    }

    #[test]
    fn test_unpremultiply() {
        let buffer = PixelBuffer::from_vec(1, 1, ChannelOrder::Bgra, vec![0, 0, 64, 128]).unwrap();
        assert_eq!(buffer.to_straight_rgba(), vec![128, 0, 0, 128]);
    }

    #[test]
    fn test_silhouette_mismatch() {
        let a = PixelBuffer::from_vec(2, 1, ChannelOrder::Rgba, vec![0, 0, 0, 255, 0, 0, 0, 0]).unwrap();
        let b = PixelBuffer::from_vec(2, 1, ChannelOrder::Bgra, vec![0, 0, 0, 255, 0, 0, 0, 255]).unwrap();
        assert_eq!(a.view().silhouette_mismatch(&b.view(), 127), Some(1));
        assert_eq!(a.view().silhouette_mismatch(&a.view(), 127), Some(0));
    }
}
