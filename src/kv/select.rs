use crate::cmd::NvmeCommand;
use crate::dma::{Allocator, Dma};
use crate::error::Error;
use crate::kv::flags::{SelectDataType, SelectHeaderOptions};
use crate::kv::payload::Payload;
use crate::kv::request::{KvCallback, KvQueuePair};

/// SEND_SELECT trampoline (spec §4.5): copies `query` into a scratch `Dma<u8>` the
/// binder owns for the life of the request and frees exactly once, right before
/// `callback` runs — mirroring `_kvselect_send_cb_internal`'s free-on-completion
/// discipline without exposing a raw free function to callers.
#[allow(clippy::too_many_arguments)]
pub fn send_select<A: Allocator>(
    qp: &mut KvQueuePair<A>,
    key: &[u8],
    query: &[u8],
    input_type: SelectDataType,
    output_type: SelectDataType,
    header_opts: SelectHeaderOptions,
    callback: KvCallback,
) -> Result<(), Error> {
    // The DMA payload carries a trailing NUL the device's query parser expects;
    // CDW10 below still reports `query.len()`, the text length alone.
    let scratch_len = query.len() + 1;
    let mut scratch: Dma<u8> = Dma::allocate(scratch_len, 4096, qp.allocator())
        .map_err(Error::Allocate)?;
    scratch[0..query.len()].copy_from_slice(query);
    scratch[query.len()] = 0;

    let physical_address = qp
        .allocator()
        .translate_virtual_to_physical(scratch.virtual_address as *const u8)
        .map_err(Error::TranslateVirtualToPhysical)? as u64;

    let command_id = qp.next_command_id();
    let mut command = NvmeCommand::kv_send_select(
        command_id,
        qp.namespace_id(),
        key,
        query.len() as u32,
        input_type,
        output_type,
        header_opts,
    )?;
    command.data_pointer = [physical_address, 0];

    let payload = Payload::Contiguous {
        addr: scratch.virtual_address as usize,
        len: scratch_len,
    };
    qp.bind_and_submit(command, Some(payload), Some(scratch), callback)
}

/// SEND_SELECT over a caller-managed scatter-gather buffer (spec §4.5, §9's SGL
/// variant): the query already lives in DMA-mapped memory the caller owns, so there
/// is no scratch copy to release — `payload` carries the reset/next callback pair and
/// `physical_address` points at the caller's own PRP/SGL descriptor.
#[allow(clippy::too_many_arguments)]
pub fn send_select_sgl<A: Allocator>(
    qp: &mut KvQueuePair<A>,
    key: &[u8],
    query_length: u32,
    physical_address: u64,
    payload: Payload,
    input_type: SelectDataType,
    output_type: SelectDataType,
    header_opts: SelectHeaderOptions,
    callback: KvCallback,
) -> Result<(), Error> {
    let command_id = qp.next_command_id();
    let mut command = NvmeCommand::kv_send_select(
        command_id,
        qp.namespace_id(),
        key,
        query_length,
        input_type,
        output_type,
        header_opts,
    )?;
    command.data_pointer = [physical_address, 0];

    qp.bind_and_submit(command, Some(payload), None, callback)
}
