//! Fuzz target: file command body decoders
//!
//! Every decoder must either reject the input or produce values whose
//! re-encoding decodes to the same thing.
//!
//! cargo fuzz run fuzz_fs_bodies

#![no_main]

use devmgmt::cmd::fs::codec::{self, DownloadReply};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(req) = codec::decode_download_req(data) {
        let again = codec::encode_download_req(req.name, req.off).unwrap();
        assert_eq!(codec::decode_download_req(&again).unwrap(), req);
    }

    if let Ok(DownloadReply::Chunk(chunk)) = codec::decode_download_rsp(data) {
        let again = codec::encode_download_rsp(chunk.off, &chunk.data, chunk.len).unwrap();
        assert_eq!(
            codec::decode_download_rsp(&again).unwrap(),
            DownloadReply::Chunk(chunk)
        );
    }

    if let Ok(req) = codec::decode_upload_req(data) {
        let again = codec::encode_upload_req(&req).unwrap();
        assert_eq!(codec::decode_upload_req(&again).unwrap(), req);
    }

    let _ = codec::decode_upload_ack(data);
});
