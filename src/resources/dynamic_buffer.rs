//! Per-Frame Dynamic Buffer
//!
//! Discard-and-remap staging for per-primitive attributes and joint
//! matrices: each frame the CPU staging region is cleared, fully rewritten,
//! and uploaded in one `write_buffer` before any draw reads it. Callers
//! never read back through this path.
//!
//! Offsets handed out by [`DynamicBuffer::push`] are aligned to the dynamic
//! uniform offset requirement so they can be used directly as bind-group
//! dynamic offsets. Growing past capacity reallocates the GPU buffer and
//! bumps the generation counter — dependent bind groups must be rebuilt
//! when the generation changes.

const DEFAULT_CAPACITY: u64 = 64 * 1024;

pub struct DynamicBuffer {
    label: String,
    buffer: wgpu::Buffer,
    staging: Vec<u8>,
    alignment: u64,
    generation: u64,
}

impl DynamicBuffer {
    #[must_use]
    pub fn new(device: &wgpu::Device, label: &str, usage: wgpu::BufferUsages) -> Self {
        let alignment = u64::from(device.limits().min_uniform_buffer_offset_alignment);
        let buffer = Self::create_buffer(device, label, DEFAULT_CAPACITY, usage);
        Self {
            label: label.to_string(),
            buffer,
            staging: Vec::with_capacity(DEFAULT_CAPACITY as usize),
            alignment,
            generation: 1,
        }
    }

    fn create_buffer(
        device: &wgpu::Device,
        label: &str,
        size: u64,
        usage: wgpu::BufferUsages,
    ) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: usage | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    /// Discards the previous frame's contents.
    pub fn begin_frame(&mut self) {
        self.staging.clear();
    }

    /// Reserves an aligned region of `size` bytes and returns
    /// `(offset, slice)` for the caller to fill.
    pub fn push(&mut self, size: usize) -> (u32, &mut [u8]) {
        let aligned_len = self.staging.len().next_multiple_of(self.alignment as usize);
        self.staging.resize(aligned_len + size, 0);
        let offset = aligned_len as u32;
        (offset, &mut self.staging[aligned_len..aligned_len + size])
    }

    /// Uploads the staged bytes, growing the GPU buffer first when needed.
    ///
    /// Must be called after the last `push` of the frame and before the
    /// first draw that reads the buffer.
    pub fn end_frame(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) {
        if self.staging.is_empty() {
            return;
        }

        let needed = self.staging.len() as u64;
        if needed > self.buffer.size() {
            let new_size = needed.next_power_of_two();
            log::info!(
                "dynamic buffer '{}': growing {} -> {new_size} bytes",
                self.label,
                self.buffer.size()
            );
            self.buffer = Self::create_buffer(device, &self.label, new_size, self.buffer.usage());
            self.generation += 1;
        }

        queue.write_buffer(&self.buffer, 0, &self.staging);
    }

    #[inline]
    #[must_use]
    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    /// Bumped whenever the underlying GPU buffer is reallocated.
    #[inline]
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Bytes staged so far this frame.
    #[inline]
    #[must_use]
    pub fn staged_len(&self) -> usize {
        self.staging.len()
    }
}
