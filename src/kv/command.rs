use crate::cmd::NvmeCommand;
use crate::error::Error;
use crate::kv::flags::{SelectDataType, SelectHeaderOptions, SelectRetrieveOpts, StoreFlags};
use crate::kv::key::{self, MAX_KEY_LENGTH};

/// KV opcodes, wire values fixed by the device (spec §6).
pub(crate) const KV_LIST: u8 = 0x06;
pub(crate) const KV_DELETE: u8 = 0x10;
pub(crate) const KV_EXIST: u8 = 0x14;
pub(crate) const KV_STORE: u8 = 0x81;
pub(crate) const KV_RETRIEVE: u8 = 0x82;
pub(crate) const KV_SEND_SELECT: u8 = 0x85;
pub(crate) const KV_RETRIEVE_SELECT: u8 = 0x86;

fn base_command(opcode: u8, command_id: u16, namespace_id: u32) -> NvmeCommand {
    NvmeCommand {
        opcode,
        command_id,
        namespace_id,
        ..Default::default()
    }
}

fn require_nonempty_key(key: &[u8]) -> Result<(), Error> {
    if key.is_empty() {
        return Err(Error::InvalidKeyLength(0));
    }
    Ok(())
}

impl NvmeCommand {
    /// LIST: prefix may be empty (matches every key in the namespace). `physical_address`
    /// is the result buffer the device writes the matching key stream into.
    pub(crate) fn kv_list(
        command_id: u16,
        namespace_id: u32,
        prefix: &[u8],
        buffer_size: u32,
        physical_address: u64,
    ) -> Result<Self, Error> {
        let mut cmd = base_command(KV_LIST, command_id, namespace_id);
        key::pack_key(&mut cmd, prefix, true)?;
        cmd.cdw10 = buffer_size;
        cmd.data_pointer = [physical_address, 0];
        Ok(cmd)
    }

    pub(crate) fn kv_delete(command_id: u16, namespace_id: u32, key: &[u8]) -> Result<Self, Error> {
        require_nonempty_key(key)?;
        let mut cmd = base_command(KV_DELETE, command_id, namespace_id);
        key::pack_key(&mut cmd, key, true)?;
        Ok(cmd)
    }

    pub(crate) fn kv_exist(command_id: u16, namespace_id: u32, key: &[u8]) -> Result<Self, Error> {
        require_nonempty_key(key)?;
        let mut cmd = base_command(KV_EXIST, command_id, namespace_id);
        key::pack_key(&mut cmd, key, true)?;
        Ok(cmd)
    }

    pub(crate) fn kv_store(
        command_id: u16,
        namespace_id: u32,
        key: &[u8],
        payload_size: u32,
        store_flags: StoreFlags,
    ) -> Result<Self, Error> {
        require_nonempty_key(key)?;
        store_flags.validate()?;
        let mut cmd = base_command(KV_STORE, command_id, namespace_id);
        // key length goes in the low byte; store flags occupy bits [15:8].
        key::pack_key(&mut cmd, key, false)?;
        cmd.cdw11 = (key.len() as u32 & 0xFF) | ((store_flags.0 as u32) << 8);
        cmd.cdw10 = payload_size;
        Ok(cmd)
    }

    pub(crate) fn kv_retrieve(
        command_id: u16,
        namespace_id: u32,
        key: &[u8],
        buffer_size: u32,
        offset: u32,
    ) -> Result<Self, Error> {
        require_nonempty_key(key)?;
        let mut cmd = base_command(KV_RETRIEVE, command_id, namespace_id);
        key::pack_key(&mut cmd, key, true)?;
        cmd.cdw10 = buffer_size;
        cmd.cdw12 = offset;
        Ok(cmd)
    }

    /// SEND_SELECT. `query_length` excludes any NUL terminator the caller's payload
    /// may carry — callers that add one (the contiguous-buffer trampoline) must pass
    /// the length of the query text alone, per the CDW10/payload-length asymmetry in
    /// the original wire format.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn kv_send_select(
        command_id: u16,
        namespace_id: u32,
        key: &[u8],
        query_length: u32,
        input_type: SelectDataType,
        output_type: SelectDataType,
        header_opts: SelectHeaderOptions,
    ) -> Result<Self, Error> {
        require_nonempty_key(key)?;
        header_opts.validate()?;
        let mut cmd = base_command(KV_SEND_SELECT, command_id, namespace_id);
        key::pack_key(&mut cmd, key, false)?;
        let select_bits =
            header_opts.0 as u32 | (input_type as u32) << 8 | (output_type as u32) << 16;
        cmd.cdw11 = (key.len() as u32 & 0xFF) | (select_bits << 8);
        cmd.cdw10 = query_length;
        Ok(cmd)
    }

    /// RETRIEVE_SELECT. Has no key; the key packer is bypassed and the key-length
    /// byte of CDW11 stays zero.
    pub(crate) fn kv_retrieve_select(
        command_id: u16,
        namespace_id: u32,
        select_id: u32,
        offset: u32,
        buffer_size: u32,
        opts: SelectRetrieveOpts,
    ) -> Result<Self, Error> {
        let mut cmd = base_command(KV_RETRIEVE_SELECT, command_id, namespace_id);
        cmd.cdw10 = buffer_size;
        cmd.cdw11 = opts as u32;
        cmd.cdw12 = offset;
        cmd.cdw13 = select_id;
        Ok(cmd)
    }
}

pub(crate) fn validate_key_length(len: usize, allow_empty: bool) -> Result<(), Error> {
    if len > MAX_KEY_LENGTH {
        return Err(Error::InvalidKeyLength(len));
    }
    if len == 0 && !allow_empty {
        return Err(Error::InvalidKeyLength(0));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::key::unpack_key;

    #[test]
    fn list_with_empty_key_succeeds() {
        let cmd = NvmeCommand::kv_list(1, 1, &[], 4096, 0xABCD_0000).unwrap();
        assert_eq!(cmd.opcode, KV_LIST);
        assert_eq!(cmd.cdw10, 4096);
        assert_eq!(cmd.cdw11, 0);
        assert_eq!(cmd.data_pointer, [0xABCD_0000, 0]);
    }

    #[test]
    fn delete_with_empty_key_is_rejected() {
        let err = NvmeCommand::kv_delete(1, 1, &[]).unwrap_err();
        assert!(matches!(err, Error::InvalidKeyLength(0)));
    }

    #[test]
    fn exist_with_empty_key_is_rejected() {
        let err = NvmeCommand::kv_exist(1, 1, &[]).unwrap_err();
        assert!(matches!(err, Error::InvalidKeyLength(0)));
    }

    #[test]
    fn store_with_empty_key_is_rejected() {
        let err = NvmeCommand::kv_store(1, 1, &[], 100, StoreFlags::none()).unwrap_err();
        assert!(matches!(err, Error::InvalidKeyLength(0)));
    }

    #[test]
    fn retrieve_with_empty_key_is_rejected() {
        let err = NvmeCommand::kv_retrieve(1, 1, &[], 100, 0).unwrap_err();
        assert!(matches!(err, Error::InvalidKeyLength(0)));
    }

    #[test]
    fn send_select_with_empty_key_is_rejected() {
        let err = NvmeCommand::kv_send_select(
            1,
            1,
            &[],
            10,
            SelectDataType::Csv,
            SelectDataType::Csv,
            SelectHeaderOptions::none(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidKeyLength(0)));
    }

    #[test]
    fn key_length_over_sixteen_is_always_rejected() {
        let key = [1u8; 17];
        let err = NvmeCommand::kv_delete(1, 1, &key).unwrap_err();
        assert!(matches!(err, Error::InvalidKeyLength(17)));
    }

    #[test]
    fn store_rejects_conflicting_flags() {
        let err = NvmeCommand::kv_store(
            1,
            1,
            b"key",
            10,
            StoreFlags(StoreFlags::MUST_EXIST | StoreFlags::MUST_NOT_EXIST),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidStoreFlags(_)));
    }

    #[test]
    fn send_select_composes_cdw11_high_bits_and_key_length() {
        let cmd = NvmeCommand::kv_send_select(
            1,
            1,
            b"~TEST_04",
            42,
            SelectDataType::Parquet,
            SelectDataType::Csv,
            SelectHeaderOptions(SelectHeaderOptions::OUTPUT_HEADER),
        )
        .unwrap();
        let expected_high = SelectHeaderOptions::OUTPUT_HEADER as u32
            | (SelectDataType::Parquet as u32) << 8
            | (SelectDataType::Csv as u32) << 16;
        assert_eq!(cmd.cdw11 >> 8, expected_high);
        assert_eq!(cmd.cdw11 & 0xFF, 8);
        assert_eq!(cmd.cdw10, 42);
        assert_eq!(unpack_key(&cmd)[..8], *b"~TEST_04");
    }

    #[test]
    fn retrieve_select_has_no_key_and_zero_length_byte() {
        let cmd =
            NvmeCommand::kv_retrieve_select(1, 1, 7, 200, 4096, SelectRetrieveOpts::NoFree)
                .unwrap();
        assert_eq!(cmd.opcode, KV_RETRIEVE_SELECT);
        assert_eq!(cmd.cdw11, SelectRetrieveOpts::NoFree as u32);
        assert_eq!(cmd.cdw11 & 0xFF, SelectRetrieveOpts::NoFree as u32 & 0xFF);
        assert_eq!(cmd.cdw12, 200);
        assert_eq!(cmd.cdw13, 7);
        assert_eq!(cmd.cdw10, 4096);
    }

    #[test]
    fn store_composes_flags_in_high_byte_of_cdw11() {
        let cmd = NvmeCommand::kv_store(1, 1, b"k", 10, StoreFlags(StoreFlags::APPEND)).unwrap();
        assert_eq!(cmd.cdw11 & 0xFF, 1);
        assert_eq!((cmd.cdw11 >> 8) & 0xFF, StoreFlags::APPEND as u32);
    }
}
