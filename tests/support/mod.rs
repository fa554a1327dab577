#![allow(dead_code, reason = "each test crate uses a subset of these helpers")]

use std::{
    env,
    ffi::OsString,
    fs,
    io::{Cursor, Write},
    path::{Path, PathBuf},
};

use attention_viz::{
    providers::StateDict,
    tests::support::{checkpoint_bytes, uniform_state_dict},
};
use serde_json::json;
use zip::{CompressionMethod, ZipWriter, write::SimpleFileOptions};

/// Write one dataset record as `<dir>/<file_name>`.
pub fn write_sample(
    dir: &Path,
    file_name: &str,
    form_type: &str,
    form_number: u32,
    demographic: &str,
    labels: &[u8],
) -> PathBuf {
    #[expect(clippy::cast_precision_loss, reason = "fixture indices are small")]
    let points: Vec<[f32; 3]> = (0..labels.len())
        .map(|i| {
            let t = i as f32;
            [t, t * t, -t]
        })
        .collect();
    let record = json!({
        "form_type": form_type,
        "form_number": form_number,
        "demographic": demographic,
        "points": points,
        "labels": labels,
    });
    let path = dir.join(file_name);
    fs::write(&path, record.to_string()).unwrap_or_else(|e| panic!("write sample: {e}"));
    path
}

/// Create `<root>/<run>/<file_name>` holding a restorable checkpoint that
/// predicts `class` everywhere.
pub fn write_checkpoint(root: &Path, run: &str, file_name: &str, class: usize) -> PathBuf {
    let dir = root.join(run);
    fs::create_dir_all(&dir).unwrap_or_else(|e| panic!("create run dir: {e}"));
    let bytes = checkpoint_bytes(&uniform_state_dict(class), "model_state_dict", None);
    let path = dir.join(file_name);
    fs::write(&path, bytes).unwrap_or_else(|e| panic!("write checkpoint: {e}"));
    path
}

/// Pickle opcodes used by `torch.save` for a dict of float tensors.
mod pickle {
    pub const PROTO: u8 = 0x80;
    pub const EMPTY_DICT: u8 = b'}';
    pub const MARK: u8 = b'(';
    pub const TUPLE: u8 = b't';
    pub const BINPERSID: u8 = b'Q';
    pub const REDUCE: u8 = b'R';
    pub const SETITEM: u8 = b's';
    pub const NEWFALSE: u8 = 0x89;
    pub const BININT: u8 = b'J';
    pub const BINUNICODE: u8 = b'X';
    pub const GLOBAL: u8 = b'c';
    pub const STOP: u8 = b'.';
}

struct PickleWriter(Vec<u8>);

impl PickleWriter {
    fn op(&mut self, code: u8) -> &mut Self {
        self.0.push(code);
        self
    }

    fn text(&mut self, value: &str) -> &mut Self {
        let len = u32::try_from(value.len()).unwrap_or_else(|e| panic!("{e}"));
        self.op(pickle::BINUNICODE);
        self.0.extend(len.to_le_bytes());
        self.0.extend(value.as_bytes());
        self
    }

    fn int(&mut self, value: usize) -> &mut Self {
        let value = i32::try_from(value).unwrap_or_else(|e| panic!("{e}"));
        self.op(pickle::BININT);
        self.0.extend(value.to_le_bytes());
        self
    }

    fn global(&mut self, module: &str, name: &str) -> &mut Self {
        self.op(pickle::GLOBAL);
        self.0.extend(format!("{module}\n{name}\n").as_bytes());
        self
    }

    fn int_tuple(&mut self, values: &[usize]) -> &mut Self {
        self.op(pickle::MARK);
        for &value in values {
            self.int(value);
        }
        self.op(pickle::TUPLE)
    }

    /// `_rebuild_tensor_v2(storage, 0, shape, stride, False, {})` over the
    /// float storage stored as `archive/data/<storage>`.
    fn tensor(&mut self, storage: usize, shape: &[usize]) -> &mut Self {
        let numel = shape.iter().product();
        // Contiguous strides: each axis steps over the product of the later ones.
        let mut strides: Vec<usize> = shape
            .iter()
            .rev()
            .scan(1, |step, &dim| {
                let stride = *step;
                *step *= dim;
                Some(stride)
            })
            .collect();
        strides.reverse();
        self.global("torch._utils", "_rebuild_tensor_v2");
        self.op(pickle::MARK);
        self.op(pickle::MARK)
            .text("storage")
            .global("torch", "FloatStorage")
            .text(&storage.to_string())
            .text("cpu")
            .int(numel)
            .op(pickle::TUPLE)
            .op(pickle::BINPERSID);
        self.int(0).int_tuple(shape).int_tuple(&strides);
        self.op(pickle::NEWFALSE).op(pickle::EMPTY_DICT);
        self.op(pickle::TUPLE).op(pickle::REDUCE)
    }
}

/// Write `state` the way `torch.save({state_key: state, "epoch": 7}, path)`
/// lays it out: a zip archive holding `archive/data.pkl` and one raw
/// little-endian storage file per tensor.
pub fn write_torch_checkpoint(path: &Path, state_key: &str, state: &StateDict) {
    let mut pickle = PickleWriter(Vec::new());
    pickle.op(pickle::PROTO).op(2).op(pickle::EMPTY_DICT);
    pickle.text(state_key).op(pickle::EMPTY_DICT);
    let mut storages = Vec::new();
    for (index, (name, tensor)) in state.tensors().enumerate() {
        pickle.text(name).tensor(index, tensor.shape()).op(pickle::SETITEM);
        let bytes: Vec<u8> = tensor.iter().flat_map(|v| v.to_le_bytes()).collect();
        storages.push(bytes);
    }
    pickle.op(pickle::SETITEM);
    pickle.text("epoch").int(7).op(pickle::SETITEM);
    pickle.op(pickle::STOP);

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let mut archive = ZipWriter::new(Cursor::new(Vec::new()));
    let mut add = |name: String, bytes: &[u8]| {
        archive
            .start_file(name, options)
            .unwrap_or_else(|e| panic!("start zip entry: {e}"));
        archive
            .write_all(bytes)
            .unwrap_or_else(|e| panic!("write zip entry: {e}"));
    };
    add("archive/data.pkl".to_owned(), &pickle.0);
    add("archive/version".to_owned(), b"3\n");
    for (index, bytes) in storages.iter().enumerate() {
        add(format!("archive/data/{index}"), bytes);
    }
    let bytes = archive
        .finish()
        .unwrap_or_else(|e| panic!("finish zip: {e}"))
        .into_inner();
    fs::write(path, bytes).unwrap_or_else(|e| panic!("write torch checkpoint: {e}"));
}

/// Minimal YAML configuration pointing at the given directories.
pub fn config_yaml(checkpoint_dir: &Path, data_dir: &Path, output_dir: &Path) -> String {
    format!(
        "model:\n  k: 3\n  dropout: 0.5\ntraining:\n  checkpoint_dir: {}\ndata:\n  path: {}\nvisualization:\n  output_dir: {}\n  dpi: 30\n",
        checkpoint_dir.display(),
        data_dir.display(),
        output_dir.display()
    )
}

/// Sets `ATTNVIZ_*` variables for one test and restores the previous values
/// on drop. Callers must be `#[serial]`.
pub struct ScopedEnv {
    saved: Vec<(String, Option<OsString>)>,
}

impl ScopedEnv {
    pub fn set(vars: &[(&str, &str)]) -> Self {
        let saved = vars
            .iter()
            .map(|(key, value)| {
                let previous = env::var_os(key);
                // Safety: tests that mutate the environment run under #[serial].
                unsafe { env::set_var(key, value) };
                ((*key).to_owned(), previous)
            })
            .collect();
        Self { saved }
    }
}

impl Drop for ScopedEnv {
    fn drop(&mut self) {
        for (key, previous) in self.saved.drain(..).rev() {
            // Safety: tests that mutate the environment run under #[serial].
            unsafe {
                match previous {
                    Some(value) => env::set_var(&key, value),
                    None => env::remove_var(&key),
                }
            }
        }
    }
}
