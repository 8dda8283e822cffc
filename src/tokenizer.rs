// The external analyzer and the on-disk layout of its outputs.

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use tracing::debug;

use crate::error::TokdiffError;
use crate::segmenter::Segment;

/// Extension of compressed analyzer output
pub const COMPRESSED_EXTENSION: &str = "zst";

/// Suffix that replaces `.txt.zst` on rendered diff files
pub const DIFF_SUFFIX: &str = ".diff.txt";

const ZSTD_LEVEL: i32 = 3;

/// Runs the analyzer over one byte range of an input file.
///
/// The output is a zstd-compressed stream of tab-separated token records,
/// nine fields each, with an `EOS` line after every sentence.
pub trait Tokenizer: Send + Sync {
    fn analyze(&self, input: &Path, segment: Segment, output: &Path) -> Result<(), TokdiffError>;
}

/// Tokenizer backed by an external program reading text on stdin and
/// writing token records on stdout
#[derive(Debug, Clone)]
pub struct CommandTokenizer {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandTokenizer {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl Tokenizer for CommandTokenizer {
    fn analyze(&self, input: &Path, segment: Segment, output: &Path) -> Result<(), TokdiffError> {
        let io_err = |what: &str, e: io::Error| TokdiffError::io(format!("{what} for {}", input.display()), e);

        let mut source = File::open(input).map_err(|e| io_err("opening input", e))?;
        source
            .seek(SeekFrom::Start(segment.start))
            .map_err(|e| io_err("seeking input", e))?;
        let limited = source.take(segment.len());

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| TokdiffError::Tokenizer {
                path: input.to_path_buf(),
                message: format!("cannot start {}: {e}", self.program.display()),
            })?;

        let result = drive_child(&mut child, limited, input, output);
        if result.is_err() {
            // Never leave a running child or a partial output behind
            let _ = child.kill();
            let _ = child.wait();
            let _ = fs::remove_file(output);
        }
        let produced = result?;

        debug!(
            "Analyzed {} [{}, {}) -> {} ({} bytes of tokens)",
            input.display(),
            segment.start,
            segment.end,
            output.display(),
            produced
        );
        Ok(())
    }
}

/// Feed `source` to the child, compress its stdout into `output` and check its exit status
fn drive_child(
    child: &mut Child,
    mut source: impl Read + Send + 'static,
    input: &Path,
    output: &Path,
) -> Result<u64, TokdiffError> {
    let io_err = |what: &str, e: io::Error| TokdiffError::io(format!("{what} for {}", input.display()), e);

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| TokdiffError::invariant("tokenizer stdin was not captured"))?;
    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| TokdiffError::invariant("tokenizer stdout was not captured"))?;
    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| TokdiffError::invariant("tokenizer stderr was not captured"))?;

    let feeder = thread::spawn(move || -> io::Result<u64> {
        let copied = io::copy(&mut source, &mut stdin);
        drop(stdin);
        copied
    });
    let stderr_reader = thread::spawn(move || {
        let mut message = String::new();
        let _ = stderr.read_to_string(&mut message);
        message
    });

    let produced = match compress_into(&mut stdout, output) {
        Ok(produced) => produced,
        Err(e) => {
            // Killing the child closes its pipes, which lets both helper threads finish
            let _ = child.kill();
            let _ = child.wait();
            let _ = feeder.join();
            let _ = stderr_reader.join();
            return Err(e);
        }
    };

    let status = child.wait().map_err(|e| io_err("waiting for tokenizer", e))?;
    let fed = feeder
        .join()
        .map_err(|_| TokdiffError::invariant("tokenizer feeder thread panicked"))?;
    let stderr_text = stderr_reader.join().unwrap_or_default();

    if !status.success() {
        return Err(TokdiffError::Tokenizer {
            path: input.to_path_buf(),
            message: format!("{status}: {}", stderr_text.trim()),
        });
    }
    match fed {
        Ok(_) => Ok(produced),
        // tokenizer may legitimately stop reading once it has all it needs
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(produced),
        Err(e) => Err(io_err("feeding tokenizer", e)),
    }
}

fn compress_into(stdout: &mut impl Read, output: &Path) -> Result<u64, TokdiffError> {
    let io_err = |what: &str, e: io::Error| TokdiffError::io(format!("{what} {}", output.display()), e);
    let writer = create_output(output)?;
    let mut encoder = zstd::stream::Encoder::new(writer, ZSTD_LEVEL).map_err(|e| io_err("compressing", e))?;
    let produced = io::copy(stdout, &mut encoder).map_err(|e| io_err("writing", e))?;
    encoder.finish().map_err(|e| io_err("finishing", e))?;
    Ok(produced)
}

fn create_output(output: &Path) -> Result<File, TokdiffError> {
    let context = || format!("creating {}", output.display());
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent).map_err(|e| TokdiffError::io(context(), e))?;
    }
    File::create(output).map_err(|e| TokdiffError::io(context(), e))
}

fn relative_to<'a>(path: &'a Path, root: &Path) -> Result<&'a Path, TokdiffError> {
    path.strip_prefix(root).map_err(|_| {
        TokdiffError::invariant(format!("{} is not under {}", path.display(), root.display()))
    })
}

/// `<output_root>/<relative input path>-NNNNN.txt.zst`
pub fn segment_output_path(
    input_root: &Path,
    output_root: &Path,
    input: &Path,
    index: usize,
) -> Result<PathBuf, TokdiffError> {
    let relative = relative_to(input, input_root)?;
    let name = format!("{}-{index:05}.txt.{COMPRESSED_EXTENSION}", relative.to_string_lossy());
    Ok(output_root.join(name))
}

/// `<output_root>/diffs/<relative path with .txt.zst replaced by .diff.txt>`
pub fn diff_output_path(left_root: &Path, output_root: &Path, left: &Path) -> Result<PathBuf, TokdiffError> {
    let relative = relative_to(left, left_root)?.to_string_lossy().into_owned();
    let compressed_suffix = format!(".txt.{COMPRESSED_EXTENSION}");
    let stem = relative.strip_suffix(&compressed_suffix).unwrap_or(&relative);
    Ok(output_root.join("diffs").join(format!("{stem}{DIFF_SUFFIX}")))
}

/// Path of the right-hand file matching `left`
pub fn counterpart_path(left_root: &Path, right_root: &Path, left: &Path) -> Result<PathBuf, TokdiffError> {
    Ok(right_root.join(relative_to(left, left_root)?))
}

/// Open a compressed analyzer output for streaming decompression
pub fn open_compressed(path: &Path) -> Result<zstd::stream::Decoder<'static, io::BufReader<File>>, TokdiffError> {
    let context = || format!("opening {}", path.display());
    let file = File::open(path).map_err(|e| TokdiffError::io(context(), e))?;
    zstd::stream::Decoder::new(file).map_err(|e| TokdiffError::io(context(), e))
}
