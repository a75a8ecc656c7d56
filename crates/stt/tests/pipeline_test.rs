use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use voxrelay_common::{ErrorKind, TranscribeError};
use voxrelay_stt::{
    ConverterConfig, EngineConfig, OutputLocator, PipelineConfig, ProcessError, ProcessOutput,
    ProcessRunner, ProcessSpec, TranscriptionPipeline, UploadedMedia, SUPPORTED_EXTENSIONS,
};

const HELLO_WORLD: &str = r#"{"segments":[{"text":"hello"},{"text":"world"}],"language":"en"}"#;

#[derive(Clone, Copy)]
enum Converter {
    Succeed,
    Exit(i32, &'static str),
    NoOutput,
    TimeOut,
}

#[derive(Clone, Copy)]
enum Engine {
    /// Write `<base>.json`
    Write(&'static str),
    /// Write `<base><suffix>` instead of the requested name
    WriteAs(&'static str, &'static str),
    Exit(i32, &'static str),
    NoOutput,
    TimeOut,
}

/// Stands in for ffmpeg and whisper.cpp, recording every invocation
struct ScriptedRunner {
    converter: Converter,
    engine: Engine,
    calls: Mutex<Vec<ProcessSpec>>,
}

impl ScriptedRunner {
    fn new(converter: Converter, engine: Engine) -> Arc<Self> {
        Arc::new(Self {
            converter,
            engine,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn programs(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|s| s.program.clone()).collect()
    }

    fn engine_spec(&self) -> Option<ProcessSpec> {
        self.calls.lock().unwrap().iter().find(|s| s.program == "whisper").cloned()
    }
}

fn exited(code: i32, stderr: &str) -> Result<ProcessOutput, ProcessError> {
    Ok(ProcessOutput {
        exit_code: Some(code),
        stdout: String::new(),
        stderr: stderr.to_string(),
    })
}

fn timed_out(spec: &ProcessSpec) -> Result<ProcessOutput, ProcessError> {
    Err(ProcessError::TimedOut {
        program: spec.program.clone(),
        timeout: spec.timeout,
    })
}

#[async_trait]
impl ProcessRunner for ScriptedRunner {
    async fn run(&self, spec: &ProcessSpec) -> Result<ProcessOutput, ProcessError> {
        self.calls.lock().unwrap().push(spec.clone());

        if spec.program == "ffmpeg" {
            let target = spec.args.last().unwrap();
            return match self.converter {
                Converter::Succeed => {
                    std::fs::write(target, b"RIFF\0\0\0\0WAVE").unwrap();
                    exited(0, "")
                }
                Converter::Exit(code, stderr) => exited(code, stderr),
                Converter::NoOutput => exited(0, ""),
                Converter::TimeOut => timed_out(spec),
            };
        }

        let base = spec.arg_after("-of").unwrap().to_string();
        match self.engine {
            Engine::Write(json) => {
                std::fs::write(format!("{}.json", base), json).unwrap();
                exited(0, "")
            }
            Engine::WriteAs(suffix, json) => {
                std::fs::write(format!("{}{}", base, suffix), json).unwrap();
                exited(0, "")
            }
            Engine::Exit(code, stderr) => exited(code, stderr),
            Engine::NoOutput => exited(0, ""),
            Engine::TimeOut => timed_out(spec),
        }
    }
}

fn pipeline(root: &Path, runner: Arc<ScriptedRunner>) -> TranscriptionPipeline {
    let config = PipelineConfig {
        workspace_root: root.to_path_buf(),
        converter: ConverterConfig {
            program: "ffmpeg".to_string(),
            timeout: Duration::from_secs(180),
        },
        engine: EngineConfig {
            program: "whisper".to_string(),
            ..EngineConfig::default()
        },
        max_upload_bytes: 64 * 1024 * 1024,
    };
    TranscriptionPipeline::new(config, runner).unwrap()
}

fn assert_no_workspace_left(root: &Path) {
    let left: Vec<_> = std::fs::read_dir(root).unwrap().collect();
    assert!(left.is_empty(), "workspace leaked: {:?}", left);
}

#[tokio::test]
async fn test_speech_wav_scenario() {
    let root = tempfile::TempDir::new().unwrap();
    let runner = ScriptedRunner::new(Converter::Succeed, Engine::Write(HELLO_WORLD));
    let pipeline = pipeline(root.path(), runner.clone());

    let transcript = pipeline
        .run(UploadedMedia::new("speech.wav", b"RIFF".to_vec()))
        .await
        .unwrap();

    assert_eq!(transcript.language, "en");
    assert_eq!(transcript.full_text, "hello world");
    assert_eq!(transcript.segments.len(), 2);
    assert_eq!(runner.programs(), vec!["ffmpeg", "whisper"]);
    assert_no_workspace_left(root.path());
}

#[tokio::test]
async fn test_every_supported_extension_yields_defined_outcome() {
    for ext in SUPPORTED_EXTENSIONS {
        let root = tempfile::TempDir::new().unwrap();
        let runner = ScriptedRunner::new(Converter::Succeed, Engine::Write(HELLO_WORLD));
        let result = pipeline(root.path(), runner)
            .run(UploadedMedia::new(format!("empty.{}", ext), Vec::new()))
            .await;

        assert!(result.is_ok(), "{} failed: {:?}", ext, result);
        assert_no_workspace_left(root.path());
    }
}

#[tokio::test]
async fn test_unsupported_extension_invokes_nothing() {
    let root = tempfile::TempDir::new().unwrap();
    let runner = ScriptedRunner::new(Converter::Succeed, Engine::Write(HELLO_WORLD));

    for name in ["clip.xyz", "notes.txt", "archive.tar.gz", "noext"] {
        let err = pipeline(root.path(), runner.clone())
            .run(UploadedMedia::new(name, vec![0; 8]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationFailed, "{}", name);
    }

    assert!(runner.programs().is_empty());
    assert_no_workspace_left(root.path());
}

#[tokio::test]
async fn test_repeated_runs_are_identical() {
    let root = tempfile::TempDir::new().unwrap();
    let runner = ScriptedRunner::new(Converter::Succeed, Engine::Write(HELLO_WORLD));
    let pipeline = pipeline(root.path(), runner);

    let first = pipeline
        .run(UploadedMedia::new("a.mp3", vec![7; 32]))
        .await
        .unwrap();
    let second = pipeline
        .run(UploadedMedia::new("a.mp3", vec![7; 32]))
        .await
        .unwrap();

    assert_eq!(first.full_text, second.full_text);
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_engine_failure_scenario() {
    let root = tempfile::TempDir::new().unwrap();
    let runner = ScriptedRunner::new(Converter::Succeed, Engine::Exit(1, "model load error"));

    let err = pipeline(root.path(), runner)
        .run(UploadedMedia::new("speech.wav", b"RIFF".to_vec()))
        .await
        .unwrap_err();

    match err {
        TranscribeError::EngineFailed { exit_code, stderr_excerpt } => {
            assert_eq!(exit_code, Some(1));
            assert_eq!(stderr_excerpt, "model load error");
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_no_workspace_left(root.path());
}

#[tokio::test]
async fn test_each_failure_kind_cleans_workspace() {
    let cases = [
        (Converter::Exit(1, "Invalid data"), Engine::Write(HELLO_WORLD), ErrorKind::ConversionFailed),
        (Converter::NoOutput, Engine::Write(HELLO_WORLD), ErrorKind::ConversionFailed),
        (Converter::TimeOut, Engine::Write(HELLO_WORLD), ErrorKind::ConversionTimedOut),
        (Converter::Succeed, Engine::TimeOut, ErrorKind::EngineTimedOut),
        (Converter::Succeed, Engine::NoOutput, ErrorKind::OutputNotFound),
        (Converter::Succeed, Engine::Write("{not json"), ErrorKind::OutputUnparseable),
    ];

    for (converter, engine, expected) in cases {
        let root = tempfile::TempDir::new().unwrap();
        let runner = ScriptedRunner::new(converter, engine);
        let err = pipeline(root.path(), runner)
            .run(UploadedMedia::new("speech.m4a", vec![1; 64]))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), expected, "{}", err);
        assert_no_workspace_left(root.path());
    }
}

#[tokio::test]
async fn test_conversion_failure_skips_engine() {
    let root = tempfile::TempDir::new().unwrap();
    let runner = ScriptedRunner::new(Converter::Exit(1, "moov atom not found"), Engine::Write(HELLO_WORLD));

    let err = pipeline(root.path(), runner.clone())
        .run(UploadedMedia::new("movie.mov", vec![1; 64]))
        .await
        .unwrap_err();

    assert!(err.to_string().contains("moov atom not found"));
    assert_eq!(runner.programs(), vec!["ffmpeg"]);
}

#[tokio::test]
async fn test_output_not_found_lists_produced_files() {
    let root = tempfile::TempDir::new().unwrap();
    let runner = ScriptedRunner::new(Converter::Succeed, Engine::NoOutput);

    let err = pipeline(root.path(), runner)
        .run(UploadedMedia::new("speech.flac", vec![1; 64]))
        .await
        .unwrap_err();

    match err {
        TranscribeError::OutputNotFound { expected_path, available_files } => {
            assert!(expected_path.ends_with("transcript.json"));
            assert_eq!(available_files, vec!["audio.wav", "input.flac"]);
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_naming_drift_is_tolerated() {
    let root = tempfile::TempDir::new().unwrap();
    let runner = ScriptedRunner::new(Converter::Succeed, Engine::WriteAs(".wav.json", HELLO_WORLD));

    let transcript = pipeline(root.path(), runner)
        .run(UploadedMedia::new("speech.ogg", vec![1; 64]))
        .await
        .unwrap();

    assert_eq!(transcript.full_text, "hello world");
    assert_no_workspace_left(root.path());
}

#[tokio::test]
async fn test_engine_timeout_follows_upload_size() {
    let root = tempfile::TempDir::new().unwrap();
    let runner = ScriptedRunner::new(Converter::Succeed, Engine::Write(HELLO_WORLD));

    pipeline(root.path(), runner.clone())
        .run(UploadedMedia::new("long.mp4", vec![0; 10 * 1024 * 1024]))
        .await
        .unwrap();

    let spec = runner.engine_spec().unwrap();
    assert_eq!(spec.timeout, Duration::from_secs(600));
    assert_eq!(spec.arg_after("-t"), Some("4"));
    assert_eq!(spec.arg_after("-l"), Some("auto"));
}

#[tokio::test]
async fn test_concurrent_requests_use_separate_workspaces() {
    let root = tempfile::TempDir::new().unwrap();
    let runner = ScriptedRunner::new(Converter::Succeed, Engine::Write(HELLO_WORLD));
    let pipeline = Arc::new(pipeline(root.path(), runner.clone()));

    let mut handles = Vec::new();
    for i in 0..8 {
        let pipeline = pipeline.clone();
        handles.push(tokio::spawn(async move {
            pipeline
                .run(UploadedMedia::new(format!("clip{}.wav", i), vec![i as u8; 128]))
                .await
        }));
    }

    for handle in handles {
        let transcript = handle.await.unwrap().unwrap();
        assert_eq!(transcript.full_text, "hello world");
    }

    let mut bases: Vec<_> = runner
        .calls
        .lock()
        .unwrap()
        .iter()
        .filter_map(|s| s.arg_after("-of").map(str::to_string))
        .collect();
    bases.sort();
    bases.dedup();
    assert_eq!(bases.len(), 8);
    assert_no_workspace_left(root.path());
}

#[tokio::test]
async fn test_streamed_upload_scenario() {
    let root = tempfile::TempDir::new().unwrap();
    let runner = ScriptedRunner::new(Converter::Succeed, Engine::Write(HELLO_WORLD));
    let pipeline = pipeline(root.path(), runner.clone());

    let mut staged = pipeline.begin("lecture.m4a").await.unwrap();
    let chunk = vec![3u8; 1024 * 1024];
    for _ in 0..10 {
        staged.write_chunk(&chunk).await.unwrap();
    }
    assert_eq!(staged.bytes_written(), 10 * 1024 * 1024);

    let transcript = pipeline.run_staged(staged).await.unwrap();
    assert_eq!(transcript.full_text, "hello world");

    let spec = runner.engine_spec().unwrap();
    assert_eq!(spec.timeout, Duration::from_secs(600));
    assert!(spec.arg_after("-f").unwrap().ends_with("audio.wav"));
    assert_eq!(runner.programs(), vec!["ffmpeg", "whisper"]);
    assert_no_workspace_left(root.path());
}

#[tokio::test]
async fn test_upload_staged_from_reader() {
    let root = tempfile::TempDir::new().unwrap();
    let runner = ScriptedRunner::new(Converter::Succeed, Engine::Write(HELLO_WORLD));
    let pipeline = pipeline(root.path(), runner.clone());

    let content: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    let mut staged = pipeline.begin("call.OGG").await.unwrap();
    let mut reader: &[u8] = &content;
    assert_eq!(staged.write_from(&mut reader).await.unwrap(), 200_000);

    pipeline.run_staged(staged).await.unwrap();

    let converter = runner.calls.lock().unwrap()[0].clone();
    assert!(converter.arg_after("-i").unwrap().ends_with("input.ogg"));
    assert_eq!(runner.engine_spec().unwrap().timeout, Duration::from_secs(300));
    assert_no_workspace_left(root.path());
}

#[tokio::test]
async fn test_empty_engine_output_is_not_a_transcript() {
    let root = tempfile::TempDir::new().unwrap();
    let runner = ScriptedRunner::new(
        Converter::Succeed,
        Engine::Write(r#"{"segments":[],"language":"en"}"#),
    );

    let err = pipeline(root.path(), runner)
        .run(UploadedMedia::new("silence.wav", vec![0; 64]))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::OutputUnparseable);
    assert!(err.to_string().contains("no speech segments"));
    assert_no_workspace_left(root.path());
}

/// Picks a fixed suffix next to the requested base
struct SuffixLocator(&'static str);

impl OutputLocator for SuffixLocator {
    fn locate(&self, _dir: &Path, expected_base: &Path) -> voxrelay_common::Result<PathBuf> {
        let mut name = expected_base.as_os_str().to_os_string();
        name.push(self.0);
        Ok(PathBuf::from(name))
    }
}

#[tokio::test]
async fn test_custom_locator_is_used() {
    let root = tempfile::TempDir::new().unwrap();
    let runner = ScriptedRunner::new(Converter::Succeed, Engine::WriteAs(".result.txt", HELLO_WORLD));

    let transcript = pipeline(root.path(), runner)
        .with_locator(Arc::new(SuffixLocator(".result.txt")))
        .run(UploadedMedia::new("speech.wav", b"RIFF".to_vec()))
        .await
        .unwrap();

    assert_eq!(transcript.full_text, "hello world");
    assert_no_workspace_left(root.path());
}
