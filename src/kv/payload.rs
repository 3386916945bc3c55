/// A request's data-transfer description: either a single contiguous buffer, or a
/// scatter-gather pair of callbacks that iterate physically contiguous segments of a
/// logical buffer (spec §3, §4.4, §9).
///
/// The Command Builder and Request Binder are payload-agnostic; only the underlying
/// submission path (outside this core, §1) interprets the tag to perform DMA mapping.
pub enum Payload {
    /// A single (virtual address, length) pair. The caller guarantees the memory is
    /// DMA-mappable for the lifetime of the request.
    Contiguous { addr: usize, len: usize },
    /// `reset_fn(ctx, sgl_offset)` repositions the iterator at a byte offset into the
    /// logical buffer. `next_fn(ctx, &mut addr, &mut len)` yields the next physically
    /// contiguous segment and advances; it reports end-of-segments by writing `len = 0`
    /// and `addr = 0`. `total_len` is the payload size carried out-of-band.
    Sgl {
        reset_fn: fn(*mut (), u32),
        next_fn: fn(*mut (), &mut usize, &mut usize),
        ctx: *mut (),
        total_len: usize,
    },
}

// The descriptor is only ever touched by the single thread that owns the queue pair
// it was submitted on (spec §5); the raw SGL context pointer crosses thread boundaries
// only when the caller itself does, which is the caller's responsibility to uphold.
unsafe impl Send for Payload {}

impl Payload {
    pub fn len(&self) -> usize {
        match self {
            Payload::Contiguous { len, .. } => *len,
            Payload::Sgl { total_len, .. } => *total_len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contiguous_len_is_reported_directly() {
        let p = Payload::Contiguous { addr: 0x1000, len: 64 };
        assert_eq!(p.len(), 64);
        assert!(!p.is_empty());
    }

    #[test]
    fn sgl_len_is_the_out_of_band_total() {
        fn reset(_ctx: *mut (), _offset: u32) {}
        fn next(_ctx: *mut (), addr: &mut usize, len: &mut usize) {
            *addr = 0;
            *len = 0;
        }
        let p = Payload::Sgl {
            reset_fn: reset,
            next_fn: next,
            ctx: core::ptr::null_mut(),
            total_len: 4096,
        };
        assert_eq!(p.len(), 4096);
    }
}
