//! CBOR bodies for the OS group.

use minicbor::{Decoder, decode};

use crate::error::{MgmtError, Result};
use crate::mgmt::cbor::{self, EncodeError};
use crate::ports::TaskInfo;

// ── Echo ─────────────────────────────────────────────────────

/// `{"d": text}`
pub fn encode_echo_req(text: &str) -> Result<Vec<u8>> {
    fn build(text: &str) -> core::result::Result<Vec<u8>, EncodeError> {
        let mut e = cbor::encoder();
        e.map(1)?.str("d")?.str(text)?;
        Ok(e.into_writer())
    }
    Ok(build(text)?)
}

pub fn decode_echo_req(body: &[u8]) -> Result<&str> {
    let mut text = None;
    cbor::decode_map(body, |key, d| {
        match key {
            "d" => text = Some(d.str()?),
            _ => d.skip()?,
        }
        Ok(())
    })?;
    text.ok_or(MgmtError::InvalidArgument)
}

/// `{"r": text}`
pub fn encode_echo_rsp(text: &str) -> Result<Vec<u8>> {
    fn build(text: &str) -> core::result::Result<Vec<u8>, EncodeError> {
        let mut e = cbor::encoder();
        e.map(1)?.str("r")?.str(text)?;
        Ok(e.into_writer())
    }
    Ok(build(text)?)
}

/// Echoed text, or the responder's error.
pub fn decode_echo_rsp(body: &[u8]) -> Result<String> {
    let mut rc = None;
    let mut text = None;
    cbor::decode_map(body, |key, d| {
        match key {
            "rc" => rc = Some(d.i32()?),
            "r" => text = Some(d.str()?),
            _ => d.skip()?,
        }
        Ok(())
    })?;
    if let Some(code) = rc {
        MgmtError::check_rc(code)?;
    }
    text.map(str::to_owned).ok_or(MgmtError::Decode)
}

// ── Task statistics ──────────────────────────────────────────

pub fn encode_taskstat_rsp(tasks: &[TaskInfo]) -> Result<Vec<u8>> {
    fn build(tasks: &[TaskInfo]) -> core::result::Result<Vec<u8>, EncodeError> {
        let mut e = cbor::encoder();
        e.map(1)?.str("tasks")?.map(tasks.len() as u64)?;
        for t in tasks {
            e.str(&t.name)?
                .map(9)?
                .str("prio")?
                .u32(t.prio)?
                .str("tid")?
                .u32(t.tid)?
                .str("state")?
                .u32(t.state)?
                .str("stkuse")?
                .u32(t.stkuse)?
                .str("stksiz")?
                .u32(t.stksiz)?
                .str("cswcnt")?
                .u32(t.cswcnt)?
                .str("runtime")?
                .u32(t.runtime)?
                .str("last_checkin")?
                .u32(t.last_checkin)?
                .str("next_checkin")?
                .u32(t.next_checkin)?;
        }
        Ok(e.into_writer())
    }
    Ok(build(tasks)?)
}

fn decode_task(name: &str, d: &mut Decoder<'_>) -> core::result::Result<TaskInfo, decode::Error> {
    let mut task = TaskInfo {
        name: name.to_owned(),
        ..TaskInfo::default()
    };
    cbor::for_each_entry(d, |key, d| {
        match key {
            "prio" => task.prio = d.u32()?,
            "tid" => task.tid = d.u32()?,
            "state" => task.state = d.u32()?,
            "stkuse" => task.stkuse = d.u32()?,
            "stksiz" => task.stksiz = d.u32()?,
            "cswcnt" => task.cswcnt = d.u32()?,
            "runtime" => task.runtime = d.u32()?,
            "last_checkin" => task.last_checkin = d.u32()?,
            "next_checkin" => task.next_checkin = d.u32()?,
            _ => d.skip()?,
        }
        Ok(())
    })?;
    Ok(task)
}

/// Task table, or the responder's error.
pub fn decode_taskstat_rsp(body: &[u8]) -> Result<Vec<TaskInfo>> {
    let mut rc = None;
    let mut tasks = None;
    cbor::decode_map(body, |key, d| {
        match key {
            "rc" => rc = Some(d.i32()?),
            "tasks" => {
                let mut list = Vec::new();
                cbor::for_each_entry(d, |name, d| {
                    list.push(decode_task(name, d)?);
                    Ok(())
                })?;
                tasks = Some(list);
            }
            _ => d.skip()?,
        }
        Ok(())
    })?;
    if let Some(code) = rc {
        MgmtError::check_rc(code)?;
    }
    tasks.ok_or(MgmtError::Decode)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(name: &str, prio: u32) -> TaskInfo {
        TaskInfo {
            name: name.to_owned(),
            prio,
            tid: prio + 1,
            state: 1,
            stkuse: 512,
            stksiz: 2048,
            cswcnt: 77,
            runtime: 1000,
            last_checkin: 0,
            next_checkin: 0,
        }
    }

    #[test]
    fn echo_bodies() {
        let req = encode_echo_req("ping").unwrap();
        assert_eq!(decode_echo_req(&req), Ok("ping"));
        let rsp = encode_echo_rsp("ping").unwrap();
        assert_eq!(decode_echo_rsp(&rsp), Ok("ping".to_owned()));
    }

    #[test]
    fn echo_rsp_rc_wins() {
        let rsp = cbor::encode_rc(MgmtError::NotSupported.code());
        assert_eq!(decode_echo_rsp(&rsp), Err(MgmtError::NotSupported));
        assert_eq!(decode_echo_req(&cbor::empty_map()), Err(MgmtError::InvalidArgument));
    }

    #[test]
    fn taskstat_table() {
        let tasks = vec![task("idle", 15), task("main", 1)];
        let body = encode_taskstat_rsp(&tasks).unwrap();
        assert_eq!(decode_taskstat_rsp(&body), Ok(tasks));
    }

    #[test]
    fn taskstat_empty_table() {
        let body = encode_taskstat_rsp(&[]).unwrap();
        assert_eq!(decode_taskstat_rsp(&body), Ok(Vec::new()));
        assert_eq!(decode_taskstat_rsp(&cbor::empty_map()), Err(MgmtError::Decode));
    }
}
