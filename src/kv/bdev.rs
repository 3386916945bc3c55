use crate::cmd::NvmeCommand;
use crate::dma::Allocator;
use crate::error::Error;
use crate::kv::command::validate_key_length;
use crate::kv::flags::{SelectDataType, SelectHeaderOptions, SelectRetrieveOpts, StoreFlags};
use crate::kv::payload::Payload;
use crate::kv::request::{KvCallback, KvQueuePair};
use crate::kv::select;

/// An open handle to a KV namespace, carrying the read/write mode it was opened
/// with (spec §4.6) — mirrors `spdk_bdev_desc`'s write flag rather than a POSIX fd.
#[derive(Debug, Clone, Copy)]
pub struct KvDescriptor {
    writable: bool,
}

impl KvDescriptor {
    pub fn read_only() -> Self {
        KvDescriptor { writable: false }
    }

    pub fn read_write() -> Self {
        KvDescriptor { writable: true }
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }
}

fn require_writable(descriptor: &KvDescriptor) -> Result<(), Error> {
    if !descriptor.is_writable() {
        return Err(Error::KvBadDescriptor);
    }
    Ok(())
}

/// The per-thread submission path over a namespace (spec §4.6) — a thin facade over
/// a `KvQueuePair` that enforces the bdev-level argument and permission checks before
/// a command ever reaches the Command Builder.
pub struct KvChannel<A: Allocator> {
    queue_pair: KvQueuePair<A>,
}

impl<A: Allocator> KvChannel<A> {
    pub fn new(queue_pair: KvQueuePair<A>) -> Self {
        KvChannel { queue_pair }
    }

    pub fn queue_pair(&self) -> &KvQueuePair<A> {
        &self.queue_pair
    }

    pub fn queue_pair_mut(&mut self) -> &mut KvQueuePair<A> {
        &mut self.queue_pair
    }

    pub fn into_queue_pair(self) -> KvQueuePair<A> {
        self.queue_pair
    }

    /// Drains ready completions, invoking each request's callback. Non-blocking;
    /// the caller supplies its own polling loop (spec §5).
    pub fn drain_completions(&mut self) -> usize {
        self.queue_pair.drain_completions()
    }

    /// LIST. `prefix` may be empty. `physical_address` is the result buffer the device
    /// writes the matching key stream into. Requires a writable descriptor even though
    /// the namespace is left unchanged — preserved as-is from the source facade rather
    /// than "fixed" (spec Open Question, see DESIGN.md).
    pub fn kv_list(
        &mut self,
        descriptor: &KvDescriptor,
        prefix: &[u8],
        buffer_size: u32,
        physical_address: u64,
        callback: KvCallback,
    ) -> Result<(), Error> {
        validate_key_length(prefix.len(), true)?;
        require_writable(descriptor)?;
        let command_id = self.queue_pair.next_command_id();
        let command = NvmeCommand::kv_list(
            command_id,
            self.queue_pair.namespace_id(),
            prefix,
            buffer_size,
            physical_address,
        )?;
        self.queue_pair.bind_and_submit(command, None, None, callback)
    }

    /// DELETE. Requires a writable descriptor.
    pub fn kv_delete(
        &mut self,
        descriptor: &KvDescriptor,
        key: &[u8],
        callback: KvCallback,
    ) -> Result<(), Error> {
        validate_key_length(key.len(), false)?;
        require_writable(descriptor)?;
        let command_id = self.queue_pair.next_command_id();
        let command = NvmeCommand::kv_delete(command_id, self.queue_pair.namespace_id(), key)?;
        self.queue_pair.bind_and_submit(command, None, None, callback)
    }

    /// EXIST. Deliberately omits the writable-descriptor check that LIST/DELETE/
    /// STORE/SEND_SELECT enforce (spec Open Question, see DESIGN.md).
    pub fn kv_exist(
        &mut self,
        _descriptor: &KvDescriptor,
        key: &[u8],
        callback: KvCallback,
    ) -> Result<(), Error> {
        validate_key_length(key.len(), false)?;
        let command_id = self.queue_pair.next_command_id();
        let command = NvmeCommand::kv_exist(command_id, self.queue_pair.namespace_id(), key)?;
        self.queue_pair.bind_and_submit(command, None, None, callback)
    }

    /// STORE. Requires a writable descriptor. `payload` is the value to write.
    pub fn kv_store(
        &mut self,
        descriptor: &KvDescriptor,
        key: &[u8],
        payload: Payload,
        store_flags: StoreFlags,
        physical_address: u64,
        callback: KvCallback,
    ) -> Result<(), Error> {
        validate_key_length(key.len(), false)?;
        require_writable(descriptor)?;
        let command_id = self.queue_pair.next_command_id();
        let mut command = NvmeCommand::kv_store(
            command_id,
            self.queue_pair.namespace_id(),
            key,
            payload.len() as u32,
            store_flags,
        )?;
        command.data_pointer = [physical_address, 0];
        self.queue_pair
            .bind_and_submit(command, Some(payload), None, callback)
    }

    /// RETRIEVE. Also omits the writable-descriptor check.
    pub fn kv_retrieve(
        &mut self,
        _descriptor: &KvDescriptor,
        key: &[u8],
        buffer_size: u32,
        offset: u32,
        physical_address: u64,
        callback: KvCallback,
    ) -> Result<(), Error> {
        validate_key_length(key.len(), false)?;
        let command_id = self.queue_pair.next_command_id();
        let mut command = NvmeCommand::kv_retrieve(
            command_id,
            self.queue_pair.namespace_id(),
            key,
            buffer_size,
            offset,
        )?;
        command.data_pointer = [physical_address, 0];
        self.queue_pair.bind_and_submit(command, None, None, callback)
    }

    /// SEND_SELECT: submits a query for server-side evaluation. Requires a writable
    /// descriptor, same as LIST/DELETE/STORE.
    #[allow(clippy::too_many_arguments)]
    pub fn kv_send_select(
        &mut self,
        descriptor: &KvDescriptor,
        key: &[u8],
        query: &[u8],
        input_type: SelectDataType,
        output_type: SelectDataType,
        header_opts: SelectHeaderOptions,
        callback: KvCallback,
    ) -> Result<(), Error> {
        validate_key_length(key.len(), false)?;
        require_writable(descriptor)?;
        select::send_select(
            &mut self.queue_pair,
            key,
            query,
            input_type,
            output_type,
            header_opts,
            callback,
        )
    }

    /// RETRIEVE_SELECT. Also omits the writable-descriptor check. Has no key.
    #[allow(clippy::too_many_arguments)]
    pub fn kv_retrieve_select(
        &mut self,
        _descriptor: &KvDescriptor,
        select_id: u32,
        offset: u32,
        buffer_size: u32,
        opts: SelectRetrieveOpts,
        physical_address: u64,
        callback: KvCallback,
    ) -> Result<(), Error> {
        let command_id = self.queue_pair.next_command_id();
        let mut command = NvmeCommand::kv_retrieve_select(
            command_id,
            self.queue_pair.namespace_id(),
            select_id,
            offset,
            buffer_size,
            opts,
        )?;
        command.data_pointer = [physical_address, 0];
        self.queue_pair.bind_and_submit(command, None, None, callback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_only_descriptor_rejects_writes() {
        let descriptor = KvDescriptor::read_only();
        assert!(require_writable(&descriptor).is_err());
    }

    #[test]
    fn read_write_descriptor_allows_writes() {
        let descriptor = KvDescriptor::read_write();
        require_writable(&descriptor).unwrap();
    }
}
