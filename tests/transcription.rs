#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use submagic::{AppConfig, NullSink, Submagic, SubmagicError, TranscriptionRequest};
use tempfile::TempDir;
use tokio::sync::{Mutex, MutexGuard};

// Writing an executable while another test forks can make exec fail with ETXTBSY.
static SERIAL: Mutex<()> = Mutex::const_new(());

const SRT: &str = "1\n00:00:00,000 --> 00:00:01,500\nhello there\n";

/// Writes `<input>.srt` and `<input>.txt` the way whisper-cli does and records its arguments.
const FAKE_WHISPER: &str = r#"#!/bin/sh
echo "$@" > "$0.args"
while [ $# -gt 0 ]; do
  case "$1" in
    -f) input="$2"; shift ;;
  esac
  shift
done
printf '1\n00:00:00,000 --> 00:00:01,500\nhello there\n' > "$input.srt"
printf 'hello there\n' > "$input.txt"
"#;

/// Creates the chunk file named by its second-to-last argument.
const FAKE_FFMPEG: &str = r#"#!/bin/sh
echo "$@" > "$0.args"
for arg in "$@"; do
  chunk="$previous"
  previous="$arg"
done
printf 'RIFF' > "$chunk"
"#;

struct Fixture {
    dir: TempDir,
    service: Submagic,
    _serial: MutexGuard<'static, ()>,
}

impl Fixture {
    async fn new(whisper_script: &str) -> Self {
        let serial = SERIAL.lock().await;
        let dir = tempfile::tempdir().unwrap();
        let whisper_cli = script(dir.path(), "whisper-cli", whisper_script);
        let ffmpeg = script(dir.path(), "ffmpeg", FAKE_FFMPEG);
        let config = AppConfig {
            models_dir: dir.path().join("models"),
            settings_path: dir.path().join("settings.json"),
            whisper_cli,
            ffmpeg,
        };
        let service = Submagic::new(config, Arc::new(NullSink)).unwrap();
        Self {
            dir,
            service,
            _serial: serial,
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn install_model(&self, filename: &str) -> PathBuf {
        let path = self.path("models").join(filename);
        std::fs::write(&path, b"ggml").unwrap();
        path
    }

    fn media(&self) -> PathBuf {
        let path = self.path("clip.mp4");
        std::fs::write(&path, b"not really a video").unwrap();
        path
    }

    fn recorded_args(&self, tool: &str) -> Option<String> {
        std::fs::read_to_string(self.path(&format!("{tool}.args")))
            .ok()
            .map(|args| args.trim().to_string())
    }
}

fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[tokio::test]
async fn returns_subtitles_using_fixed_flags() {
    let fixture = Fixture::new(FAKE_WHISPER).await;
    let model = fixture.install_model("ggml-base.bin");
    let media = fixture.media();

    let srt = fixture
        .service
        .generate_subtitles(&TranscriptionRequest::new(&media, "", "base"))
        .await
        .unwrap();

    assert_eq!(srt, SRT);
    assert_eq!(
        fixture.recorded_args("whisper-cli").unwrap(),
        format!(
            "-m {} -f {} -otxt -osrt -l ru",
            model.display(),
            media.display()
        )
    );
}

#[tokio::test]
async fn passes_requested_language() {
    let fixture = Fixture::new(FAKE_WHISPER).await;
    fixture.install_model("ggml-tiny.en.bin");
    let media = fixture.media();

    fixture
        .service
        .generate_subtitles(&TranscriptionRequest::new(&media, "en", "tiny.en"))
        .await
        .unwrap();

    assert!(fixture.recorded_args("whisper-cli").unwrap().ends_with("-l en"));
}

#[tokio::test]
async fn missing_model_never_runs_the_tool() {
    let fixture = Fixture::new(FAKE_WHISPER).await;
    let media = fixture.media();

    let err = fixture
        .service
        .generate_subtitles(&TranscriptionRequest::new(&media, "", "small"))
        .await
        .unwrap_err();

    assert!(matches!(err, SubmagicError::ModelNotDownloaded { ref id } if id == "small"), "{err}");
    assert!(fixture.recorded_args("whisper-cli").is_none());
}

#[tokio::test]
async fn unknown_model_is_rejected() {
    let fixture = Fixture::new(FAKE_WHISPER).await;
    let err = fixture
        .service
        .generate_subtitles(&TranscriptionRequest::new(fixture.media(), "", "huge"))
        .await
        .unwrap_err();
    assert!(matches!(err, SubmagicError::UnknownModel(_)));
}

#[tokio::test]
async fn stale_output_is_not_returned() {
    let fixture = Fixture::new("#!/bin/sh\nexit 0\n").await;
    fixture.install_model("ggml-base.bin");
    let media = fixture.media();
    std::fs::write(fixture.path("clip.mp4.srt"), "old subtitles").unwrap();

    let err = fixture
        .service
        .generate_subtitles(&TranscriptionRequest::new(&media, "", "base"))
        .await
        .unwrap_err();

    assert!(matches!(err, SubmagicError::OutputMissing(ref path) if path.ends_with("clip.mp4.srt")));
    assert!(!fixture.path("clip.mp4.srt").exists());
}

#[tokio::test]
async fn failing_tool_surfaces_its_diagnostics() {
    let fixture = Fixture::new("#!/bin/sh\necho 'failed to read audio' >&2\nexit 2\n").await;
    fixture.install_model("ggml-base.bin");

    let err = fixture
        .service
        .generate_subtitles(&TranscriptionRequest::new(fixture.media(), "", "base"))
        .await
        .unwrap_err();

    match err {
        SubmagicError::TranscriptionFailed(detail) => {
            assert!(detail.contains("failed to read audio"), "{detail}")
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn range_transcription_cleans_up_chunk() {
    let fixture = Fixture::new(FAKE_WHISPER).await;
    fixture.install_model("ggml-base.bin");
    let media = fixture.media();

    let srt = fixture
        .service
        .generate_subtitles_range(&TranscriptionRequest::new(&media, "", "base"), 5.0, 12.5)
        .await
        .unwrap();

    assert_eq!(srt, SRT);
    let chunk = format!("{}_chunk_5_12.5.wav", media.display());
    assert_eq!(
        fixture.recorded_args("ffmpeg").unwrap(),
        format!(
            "-i {} -ss 5 -to 12.5 -vn -acodec pcm_s16le -ar 16000 -ac 1 {chunk} -y",
            media.display()
        )
    );
    assert!(fixture.recorded_args("whisper-cli").unwrap().contains(&format!("-f {chunk}")));

    let leftovers: Vec<_> = std::fs::read_dir(fixture.dir.path())
        .unwrap()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.contains("_chunk_"))
        .collect();
    assert!(leftovers.is_empty(), "{leftovers:?}");
}

#[tokio::test]
async fn range_transcription_reports_extraction_failure() {
    let fixture = Fixture::new(FAKE_WHISPER).await;
    fixture.install_model("ggml-base.bin");
    script(fixture.dir.path(), "ffmpeg", "#!/bin/sh\necho 'Invalid data found' >&2\nexit 1\n");

    let err = fixture
        .service
        .generate_subtitles_range(&TranscriptionRequest::new(fixture.media(), "", "base"), 0.0, 3.0)
        .await
        .unwrap_err();

    assert!(matches!(err, SubmagicError::ExtractionFailed(ref detail) if detail.contains("Invalid data")));
    assert!(fixture.recorded_args("whisper-cli").is_none());
}

#[tokio::test]
async fn cancel_transcription_stops_running_tool() {
    let fixture = Fixture::new("#!/bin/sh\necho \"$@\" > \"$0.args\"\nexec sleep 30\n").await;
    fixture.install_model("ggml-base.bin");
    let media = fixture.media();
    let started = std::time::Instant::now();
    let request = TranscriptionRequest::new(&media, "", "base");

    let (result, cancelled) = tokio::join!(
        fixture.service.generate_subtitles(&request),
        async {
            while fixture.recorded_args("whisper-cli").is_none() {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
            fixture.service.cancel_transcription(&media)
        }
    );

    assert!(cancelled);
    assert!(matches!(result, Err(SubmagicError::Cancelled)), "{result:?}");
    assert!(started.elapsed() < std::time::Duration::from_secs(10));
    assert!(!fixture.path("clip.mp4.srt").exists());
    assert!(!fixture.service.cancel_transcription(&media));
}
