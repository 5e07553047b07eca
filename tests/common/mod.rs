//! Synthetic Mobipocket books for integration tests.
//!
//! [`BookBuilder`] lays out a PDB container with a record 0 carrying a MOBI
//! header, optional EXTH block and DRM key table, followed by the text records
//! and an end-of-file record.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use mobistrip::crypto::{CipherMode, pc1_in_place};
use mobistrip::drm::key_search::{KEY_RECORD_LEN, seal_default_key_record, seal_key_record};
use mobistrip::drm::trailing_size;
use mobistrip::mobi::SectionTable;
use mobistrip::pid::Pid;

pub const CONTENT_KEY: [u8; 16] = *b"content-key-0001";
pub const MOBI_HEADER_LEN: u32 = 0xE8;
const EOF_RECORD: &[u8] = &[0xE9, 0x8E, 0x0D, 0x0A];

#[derive(Debug, Clone)]
pub enum Lock {
    Clear,
    Pid(String),
    Default,
}

#[derive(Debug, Clone)]
pub struct BookBuilder {
    pub title: String,
    pub version: u32,
    pub compression: u16,
    pub extra_flags: u16,
    pub records: Vec<Vec<u8>>,
    pub exth: Vec<(u32, Vec<u8>)>,
    pub lock: Lock,
    pub decoy_pids: Vec<String>,
}

impl BookBuilder {
    pub fn new() -> Self {
        Self {
            title: "Synthetic Book".to_string(),
            version: 6,
            compression: 2,
            extra_flags: 0,
            records: vec![
                b"The quick brown fox jumps over the lazy dog.".to_vec(),
                b"Second record of readable text, a bit longer than the first one.".to_vec(),
                vec![0x5A; 300],
            ],
            exth: Vec::new(),
            lock: Lock::Clear,
            decoy_pids: Vec::new(),
        }
    }

    pub fn locked_to(mut self, pid: &str) -> Self {
        self.lock = Lock::Pid(pid.to_string());
        self
    }

    pub fn default_lock(mut self) -> Self {
        self.lock = Lock::Default;
        self
    }

    pub fn decoy(mut self, pid: &str) -> Self {
        self.decoy_pids.push(pid.to_string());
        self
    }

    pub fn records(mut self, records: Vec<Vec<u8>>) -> Self {
        self.records = records;
        self
    }

    pub fn extra_flags(mut self, flags: u16) -> Self {
        self.extra_flags = flags;
        self
    }

    pub fn compression(mut self, compression: u16) -> Self {
        self.compression = compression;
        self
    }

    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn exth(mut self, kind: u32, data: &[u8]) -> Self {
        self.exth.push((kind, data.to_vec()));
        self
    }

    fn effective_flags(&self) -> u16 {
        if self.compression == 17480 {
            self.extra_flags
        } else {
            self.extra_flags & 0xFFFE
        }
    }

    fn key_table(&self) -> Vec<u8> {
        let mut table = Vec::new();
        for decoy in &self.decoy_pids {
            let pid = Pid::parse(decoy).expect("decoy pid");
            let record = seal_key_record(&pid, &[0xEE; 16], 0x0BAD_F00D).expect("seal");
            table.extend_from_slice(&record.to_bytes());
        }
        match &self.lock {
            Lock::Clear => {}
            Lock::Pid(pid) => {
                let pid = Pid::parse(pid).expect("pid");
                let record = seal_key_record(&pid, &CONTENT_KEY, 0x1234_5678).expect("seal");
                table.extend_from_slice(&record.to_bytes());
            }
            Lock::Default => {
                let record = seal_default_key_record(&CONTENT_KEY, 0x5555_AAAA).expect("seal");
                table.extend_from_slice(&record.to_bytes());
            }
        }
        table
    }

    fn exth_block(&self) -> Vec<u8> {
        if self.exth.is_empty() {
            return Vec::new();
        }
        let mut body = Vec::new();
        for (kind, data) in &self.exth {
            body.extend_from_slice(&kind.to_be_bytes());
            body.extend_from_slice(&((data.len() + 8) as u32).to_be_bytes());
            body.extend_from_slice(data);
        }
        let mut out = Vec::new();
        out.extend_from_slice(b"EXTH");
        out.extend_from_slice(&((body.len() + 12) as u32).to_be_bytes());
        out.extend_from_slice(&(self.exth.len() as u32).to_be_bytes());
        out.extend(body);
        while out.len() % 4 != 0 {
            out.push(0);
        }
        out
    }

    pub fn record0(&self) -> Vec<u8> {
        let header_end = 16 + MOBI_HEADER_LEN as usize;
        let exth = self.exth_block();
        let keys = self.key_table();
        let key_ptr = header_end + exth.len();
        let name_ptr = key_ptr + keys.len();

        let mut r0 = vec![0u8; header_end];
        let put16 = |r0: &mut Vec<u8>, off: usize, v: u16| {
            r0[off..off + 2].copy_from_slice(&v.to_be_bytes())
        };
        let put32 = |r0: &mut Vec<u8>, off: usize, v: u32| {
            r0[off..off + 4].copy_from_slice(&v.to_be_bytes())
        };
        let text_len: usize = self.records.iter().map(Vec::len).sum();
        put16(&mut r0, 0x00, self.compression);
        put32(&mut r0, 0x04, text_len as u32);
        put16(&mut r0, 0x08, self.records.len() as u16);
        put16(&mut r0, 0x0A, 4096);
        let crypto = if matches!(self.lock, Lock::Clear) { 0 } else { 2 };
        put16(&mut r0, 0x0C, crypto);
        r0[0x10..0x14].copy_from_slice(b"MOBI");
        put32(&mut r0, 0x14, MOBI_HEADER_LEN);
        put32(&mut r0, 0x18, 2);
        put32(&mut r0, 0x1C, 65001);
        put32(&mut r0, 0x54, name_ptr as u32);
        put32(&mut r0, 0x58, self.title.len() as u32);
        put32(&mut r0, 0x68, self.version);
        put32(&mut r0, 0x80, if exth.is_empty() { 0 } else { 0x40 });
        if keys.is_empty() {
            put32(&mut r0, 0xA8, 0xFFFF_FFFF);
        } else {
            put32(&mut r0, 0xA8, key_ptr as u32);
            put32(&mut r0, 0xAC, (keys.len() / KEY_RECORD_LEN) as u32);
            put32(&mut r0, 0xB0, keys.len() as u32);
            put32(&mut r0, 0xB4, 0);
        }
        put16(&mut r0, 0xF2, self.extra_flags);

        r0.extend(exth);
        r0.extend(keys);
        r0.extend_from_slice(self.title.as_bytes());
        r0.extend_from_slice(&[0, 0]);
        r0
    }

    fn encrypted_records(&self) -> Vec<Vec<u8>> {
        let flags = self.effective_flags();
        self.records
            .iter()
            .map(|plain| {
                let mut record = plain.clone();
                if !matches!(self.lock, Lock::Clear) {
                    let trail = trailing_size(&record, flags).expect("trailing size");
                    let payload = record.len() - trail;
                    pc1_in_place(&CONTENT_KEY, &mut record[..payload], CipherMode::Encrypt)
                        .expect("encrypt");
                }
                record
            })
            .collect()
    }

    pub fn build(&self) -> Vec<u8> {
        let mut sections = vec![self.record0()];
        sections.extend(self.encrypted_records());
        sections.push(EOF_RECORD.to_vec());

        let mut out = vec![0u8; 78];
        let name = self.title.replace(' ', "_");
        let name = name.as_bytes();
        let n = name.len().min(31);
        out[..n].copy_from_slice(&name[..n]);
        out[0x3C..0x44].copy_from_slice(b"BOOKMOBI");
        out[76..78].copy_from_slice(&(sections.len() as u16).to_be_bytes());

        let mut offset = 78 + sections.len() * 8 + 2;
        for (i, section) in sections.iter().enumerate() {
            out.extend_from_slice(&(offset as u32).to_be_bytes());
            let uid = (2 * i) as u32;
            out.push(0);
            out.extend_from_slice(&uid.to_be_bytes()[1..]);
            offset += section.len();
        }
        out.extend_from_slice(&[0, 0]);
        for section in sections {
            out.extend(section);
        }
        out
    }

    pub fn write_to(&self, dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, self.build()).expect("write book");
        path
    }
}

impl Default for BookBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Section `index` of a built book.
pub fn section(raw: &[u8], index: usize) -> Vec<u8> {
    let table = SectionTable::parse(raw).expect("section table");
    table.load_section(raw, index).expect("section").to_vec()
}

/// Read JSON lines from a report file.
pub fn read_jsonl(path: &Path) -> Vec<serde_json::Value> {
    let text = std::fs::read_to_string(path).expect("read report");
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).expect("json line"))
        .collect()
}
