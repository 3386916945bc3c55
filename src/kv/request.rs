use crate::cmd::NvmeCommand;
use crate::dma::{Allocator, Dma};
use crate::error::Error;
use crate::kv::payload::Payload;
use crate::kv::status::CompletionRecord;
use crate::queue_pairs::IoQueuePair;
use ahash::RandomState;
use alloc::boxed::Box;
use hashbrown::HashMap;
use log::{debug, warn};

/// The user completion callback, called exactly once per submitted request (spec §3, §5).
pub type KvCallback = Box<dyn FnOnce(CompletionRecord)>;

/// Default size of the free-request pool backing a `KvQueuePair` (spec §4.4, §5:
/// "per-queue-pair free request pool, not shared").
pub const DEFAULT_REQUEST_POOL_CAPACITY: usize = 128;

struct InFlightRequest {
    // Kept for the life of the request only so an SGL payload's reset/next context
    // pointer stays valid until the device has finished walking it.
    #[allow(dead_code)]
    payload: Option<Payload>,
    scratch: Option<Dma<u8>>,
    callback: KvCallback,
}

/// Wraps an `IoQueuePair` to drive the KV opcodes: Request Binder (spec §4.4)
/// plus the bookkeeping (free-list pool, in-flight map, non-blocking completion drain)
/// spec §5 assigns to a single-owner queue pair.
pub struct KvQueuePair<A: Allocator> {
    inner: IoQueuePair<A>,
    capacity: usize,
    in_flight: HashMap<u16, InFlightRequest, RandomState>,
    disconnected: bool,
}

impl<A: Allocator> KvQueuePair<A> {
    pub fn new(inner: IoQueuePair<A>, capacity: usize) -> Self {
        KvQueuePair {
            inner,
            capacity,
            in_flight: HashMap::with_hasher(RandomState::with_seeds(0, 0, 0, 0)),
            disconnected: false,
        }
    }

    pub fn namespace_id(&self) -> u32 {
        self.inner.namespace.id
    }

    /// Unwraps the underlying block-I/O queue pair, e.g. to hand it to
    /// `NvmeDevice::delete_io_queue_pair` during shutdown. Any still in-flight KV
    /// requests are dropped without their callbacks running.
    pub fn into_inner(self) -> IoQueuePair<A> {
        self.inner
    }

    pub(crate) fn allocator(&self) -> &A {
        self.inner.allocator.as_ref()
    }

    /// Marks the queue pair as disconnected at the transport level; subsequent binds
    /// fail with `Error::KvTransportFailed` (spec §4.4, §7).
    pub fn mark_disconnected(&mut self) {
        self.disconnected = true;
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// The command id the next `bind_and_submit` will use, so callers can build a
    /// command (which must carry its id) before submitting it — the same order
    /// `IoQueuePair::submit_read`/`submit_write` already use.
    pub(crate) fn next_command_id(&self) -> u16 {
        self.inner.submission.tail as u16
    }

    /// Request Binder (spec §4.4): attaches `payload` and `callback` to `command`,
    /// pulls a slot from the free-list pool, and submits. `scratch`, when present, is
    /// released exactly once, immediately before `callback` runs on completion (spec
    /// §3's scratch-buffer invariant, §4.5's trampoline).
    pub(crate) fn bind_and_submit(
        &mut self,
        command: NvmeCommand,
        payload: Option<Payload>,
        scratch: Option<Dma<u8>>,
        callback: KvCallback,
    ) -> Result<(), Error> {
        if self.disconnected {
            return Err(Error::KvTransportFailed);
        }
        if self.in_flight.len() >= self.capacity {
            return Err(Error::KvOutOfMemory);
        }

        let command_id = self.inner.submit_raw(command);
        debug!("kv request {command_id} bound and submitted");
        self.in_flight.insert(
            command_id,
            InFlightRequest {
                payload,
                scratch,
                callback,
            },
        );
        Ok(())
    }

    /// Non-blocking poll over the completion ring (spec §5's "drain completions", the
    /// only suspending primitive this core exposes). Returns the number of completions
    /// observed. Each drained request's scratch buffer, if any, is released before its
    /// callback runs; every callback fires exactly once.
    pub fn drain_completions(&mut self) -> usize {
        let mut drained = 0;
        while let Ok(entry) = self.inner.complete_one() {
            drained += 1;
            let command_id = entry.command_id;
            let status = entry.status >> 1;
            if status != 0 {
                warn!("kv request {command_id} completed with non-zero status 0x{status:X}");
            }

            let Some(mut request) = self.in_flight.remove(&command_id) else {
                warn!("completion for unknown kv request {command_id}");
                continue;
            };

            if let Some(scratch) = request.scratch.take() {
                if let Err(error) = scratch.deallocate(self.inner.allocator.as_ref()) {
                    warn!("failed to release kv scratch buffer: {error}");
                }
            }

            let record = CompletionRecord::from_raw(status, entry.command_specific);
            (request.callback)(record);
        }
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dma::Dma;
    use crate::nvme::NvmeNamespace;
    use crate::queue_pairs::IoQueuePairId;
    use crate::queues::{CompletionQueue, CompletionQueueEntry, SubmissionQueue};
    use alloc::boxed::Box;
    use alloc::sync::Arc;
    use alloc::vec::Vec;
    use core::cell::{Cell, RefCell};
    use core::error::Error as CoreError;

    struct StubAllocator {
        backing: RefCell<Vec<Box<[u8]>>>,
        released: Cell<bool>,
    }

    impl StubAllocator {
        fn new() -> Self {
            StubAllocator {
                backing: RefCell::new(Vec::new()),
                released: Cell::new(false),
            }
        }
    }

    impl Allocator for StubAllocator {
        fn allocate<T>(
            &self,
            layout: core::alloc::Layout,
        ) -> Result<*mut [T], Box<dyn CoreError>> {
            let mut buf = alloc::vec![0u8; layout.size()].into_boxed_slice();
            let ptr = buf.as_mut_ptr();
            self.backing.borrow_mut().push(buf);
            Ok(core::ptr::slice_from_raw_parts_mut(ptr as *mut T, layout.size() / core::mem::size_of::<T>().max(1)))
        }

        fn deallocate<T>(&self, _slice: *mut [T]) -> Result<(), Box<dyn CoreError>> {
            self.released.set(true);
            Ok(())
        }

        fn translate_virtual_to_physical<T>(
            &self,
            virtual_address: *const T,
        ) -> Result<*const T, Box<dyn CoreError>> {
            Ok(virtual_address)
        }
    }

    fn scratch_buffer(allocator: &StubAllocator) -> Dma<u8> {
        Dma::allocate(4, 4, allocator).unwrap()
    }

    /// Builds a `KvQueuePair` over a real (stub-backed) `IoQueuePair` so tests drive
    /// the production `drain_completions` path instead of a hand-copied duplicate.
    /// The completion queue's doorbell points at a local variable rather than real
    /// hardware, so `complete_one`'s doorbell write lands somewhere valid.
    fn queue_pair_with_one_ready_completion(
        allocator: &Arc<StubAllocator>,
        command_id: u16,
        doorbell_value: &mut u32,
    ) -> KvQueuePair<StubAllocator> {
        let submission = SubmissionQueue::new(4, 4096, 0, allocator.as_ref()).unwrap();
        let doorbell_address = doorbell_value as *mut u32 as usize;
        let completion = CompletionQueue::new(4, 4096, doorbell_address, allocator.as_ref()).unwrap();

        let entry_address = completion.get_addr() as *mut CompletionQueueEntry;
        let ready_entry = CompletionQueueEntry {
            command_specific: 0,
            _reserved: 0,
            sq_head: 0,
            sq_id: 0,
            command_id,
            status: 1, // phase bit set, SCT/SC both zero (success)
        };
        unsafe { core::ptr::write_volatile(entry_address, ready_entry) };

        let namespace = NvmeNamespace {
            id: 1,
            blocks: 0,
            block_size: 512,
        };
        let inner = IoQueuePair {
            id: IoQueuePairId(1),
            submission,
            completion,
            page_size: 4096,
            maximum_transfer_size: 1 << 20,
            allocator: allocator.clone(),
            namespace,
            device_address: 0,
            doorbell_stride: 0,
            prp_containers: HashMap::with_hasher(RandomState::with_seeds(0, 0, 0, 0)),
        };
        KvQueuePair::new(inner, DEFAULT_REQUEST_POOL_CAPACITY)
    }

    #[test]
    fn scratch_is_freed_before_callback_runs() {
        let allocator = Arc::new(StubAllocator::new());
        let command_id = 7;
        let mut doorbell_value = 0u32;
        let mut qp =
            queue_pair_with_one_ready_completion(&allocator, command_id, &mut doorbell_value);

        let scratch = scratch_buffer(allocator.as_ref());
        let allocator_in_cb = allocator.clone();
        qp.in_flight.insert(
            command_id,
            InFlightRequest {
                payload: None,
                scratch: Some(scratch),
                callback: Box::new(move |_record| {
                    assert!(
                        allocator_in_cb.released.get(),
                        "callback ran before scratch release"
                    );
                }),
            },
        );

        let drained = qp.drain_completions();
        assert_eq!(drained, 1);
        assert!(allocator.released.get(), "scratch was never released");
        assert_eq!(qp.in_flight_count(), 0);
    }
}
