/// Playback status shown in the status region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Init,
    Fetching,
    Ready,
    Connecting,
    Playing,
    Paused,
    Buffering,
    Ended,
    Error,
}

impl Status {
    pub fn label(self) -> &'static str {
        match self {
            Status::Init => "準備中…",
            Status::Fetching => "ストリーム情報取得中…",
            Status::Ready => "待機中",
            Status::Connecting => "接続中…",
            Status::Playing => "再生中",
            Status::Paused => "停止中",
            Status::Buffering => "バッファ中…",
            Status::Ended => "終了",
            Status::Error => "エラー",
        }
    }
}

/// Status label plus the free-text hint underneath it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusLine {
    pub status: Status,
    pub hint: String,
}

impl StatusLine {
    pub fn new(status: Status, hint: impl Into<String>) -> Self {
        Self {
            status,
            hint: hint.into(),
        }
    }
}

pub mod hint {
    pub const BOOTING: &str = "起動中…";
    pub const FETCHING: &str = "APIから放送URLを取得しています。";
    pub const READY: &str = "再生ボタンを押すと開始します。";
    pub const FETCH_FAILED: &str = "ストリーム情報の取得に失敗しました（ブロック/回線/制限の可能性）。";
    pub const NO_STREAM_URL: &str = "放送URLが未取得です。再起動してください。";
    pub const CONNECTING: &str = "放送に接続しています。";
    pub const PLAY_FAILED: &str = "再生に失敗しました。別のネットワークで試してください。";
    pub const WAITING: &str = "回線状況により一時的に待機しています。";
    pub const STALLED: &str = "通信が一時停止しました。";
    pub const MEDIA_ERROR: &str = "音声の読み込みでエラーが発生しました。";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_distinct() {
        let all = [
            Status::Init,
            Status::Fetching,
            Status::Ready,
            Status::Connecting,
            Status::Playing,
            Status::Paused,
            Status::Buffering,
            Status::Ended,
            Status::Error,
        ];
        let mut labels: Vec<_> = all.iter().map(|s| s.label()).collect();
        labels.sort();
        labels.dedup();
        assert_eq!(labels.len(), all.len());
    }

    #[test]
    fn status_line_keeps_hint() {
        let line = StatusLine::new(Status::Ready, hint::READY);
        assert_eq!(line.status.label(), "待機中");
        assert_eq!(line.hint, hint::READY);
    }
}
