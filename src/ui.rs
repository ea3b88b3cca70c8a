use crate::controller::Controller;
use crate::media::{MediaElement, MediaEvent};
use crate::station::StationSource;
use crate::status::Status;
use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use rand::Rng;
use ratatui::{
    backend::CrosstermBackend,
    layout::Alignment,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Paragraph, Wrap},
    Terminal,
};
use std::io::{stdout, Stdout};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::sync::oneshot::{self, error::TryRecvError};
use tracing::{error, info};

const SPINNER: [char; 10] = ['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];
const DEFAULT_TITLE: &str = "平壌FM";

pub struct UIState {
    wave_phase: f32,
    last_volume_change: Instant,
    saved_volume: Option<f32>,
    frame: usize,
}

impl UIState {
    fn new() -> Self {
        Self {
            wave_phase: 0.0,
            last_volume_change: Instant::now()
                .checked_sub(Duration::from_secs(60))
                .unwrap_or_else(Instant::now),
            saved_volume: None,
            frame: 0,
        }
    }
}

pub async fn run_ui<M, S>(
    controller: Controller<M>,
    source: S,
    media_events: UnboundedReceiver<MediaEvent>,
) -> Result<()>
where
    M: MediaElement,
    S: StationSource + Send + Sync + 'static,
{
    enable_raw_mode()?;
    let mut stdout = stdout();
    crossterm::execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = event_loop(&mut terminal, controller, source, media_events).await;

    disable_raw_mode()?;
    crossterm::execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    result
}

async fn event_loop<M, S>(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    mut controller: Controller<M>,
    source: S,
    mut media_events: UnboundedReceiver<MediaEvent>,
) -> Result<()>
where
    M: MediaElement,
    S: StationSource + Send + Sync + 'static,
{
    controller.begin_fetch();
    let (station_tx, station_rx) = oneshot::channel();
    tokio::spawn(async move {
        let _ = station_tx.send(source.fetch().await);
    });
    let mut pending_station = Some(station_rx);

    let (settled_tx, mut settled_rx) = mpsc::unbounded_channel();
    let mut ui_state = UIState::new();

    loop {
        if let Some(rx) = pending_station.as_mut() {
            match rx.try_recv() {
                Ok(result) => {
                    controller.resolve_station(result);
                    pending_station = None;
                }
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Closed) => {
                    error!("station fetch task exited without a result");
                    pending_station = None;
                }
            }
        }

        while let Ok(ev) = media_events.try_recv() {
            controller.on_media_event(ev);
        }
        while let Ok(result) = settled_rx.try_recv() {
            controller.settle(result);
        }

        ui_state.frame = ui_state.frame.wrapping_add(1);
        let playing = controller.status_line().status == Status::Playing;
        let wave_visual = generate_waveform(&mut ui_state.wave_phase, playing, controller.volume());
        let lines = status_lines(&controller, &ui_state, wave_visual);
        let title = format!(
            " ☆ {} ☆ ",
            controller.station_name().unwrap_or(DEFAULT_TITLE)
        );

        terminal.draw(|f| {
            let panel = Paragraph::new(lines)
                .wrap(Wrap { trim: false })
                .block(
                    Block::default()
                        .borders(Borders::ALL)
                        .border_type(BorderType::Rounded)
                        .title(title)
                        .title_alignment(Alignment::Center)
                        .border_style(Style::default().fg(Color::Cyan)),
                );
            f.render_widget(panel, f.size());
        })?;

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => {
                        info!("quit requested");
                        break;
                    }
                    KeyCode::Char(' ') | KeyCode::Enter => {
                        if let Some(attempt) = controller.click() {
                            let tx = settled_tx.clone();
                            tokio::spawn(async move {
                                let _ = tx.send(attempt.await);
                            });
                        }
                    }
                    KeyCode::Char('+') | KeyCode::Char('=') => {
                        nudge_volume(&mut controller, &mut ui_state, 0.1);
                    }
                    KeyCode::Char('-') => {
                        nudge_volume(&mut controller, &mut ui_state, -0.1);
                    }
                    KeyCode::Up => {
                        nudge_volume(&mut controller, &mut ui_state, 0.05);
                    }
                    KeyCode::Down => {
                        nudge_volume(&mut controller, &mut ui_state, -0.05);
                    }
                    KeyCode::Char('m') => {
                        let current_volume = controller.volume();
                        if current_volume > 0.0 {
                            ui_state.saved_volume = Some(current_volume);
                            controller.set_volume(0.0);
                        } else {
                            let restore_volume = ui_state.saved_volume.unwrap_or(0.5);
                            controller.set_volume(restore_volume);
                        }
                        ui_state.last_volume_change = Instant::now();
                    }
                    _ => {}
                }
            }
        }
    }

    Ok(())
}

fn nudge_volume<M: MediaElement>(controller: &mut Controller<M>, ui_state: &mut UIState, delta: f32) {
    controller.set_volume(controller.volume() + delta);
    ui_state.last_volume_change = Instant::now();
}

fn status_style(status: Status) -> Style {
    match status {
        Status::Playing => Style::default()
            .fg(Color::Green)
            .add_modifier(Modifier::BOLD),
        Status::Error => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        Status::Init | Status::Fetching | Status::Connecting | Status::Buffering => {
            Style::default().fg(Color::Yellow)
        }
        Status::Ready | Status::Paused | Status::Ended => Style::default().fg(Color::White),
    }
}

fn button_text(shows_pause: bool, loading: bool, frame: usize) -> String {
    let (icon, label) = if shows_pause {
        ("⏸", "停止")
    } else {
        ("▶", "再生")
    };
    if loading {
        format!("[ {} {} {} ]", icon, label, SPINNER[frame % SPINNER.len()])
    } else {
        format!("[ {} {} ]", icon, label)
    }
}

fn status_lines<M: MediaElement>(
    controller: &Controller<M>,
    ui_state: &UIState,
    wave_visual: String,
) -> Vec<Line<'static>> {
    let line = controller.status_line();
    let volume = controller.volume();
    let volume_recently_changed = ui_state.last_volume_change.elapsed() < Duration::from_secs(2);

    let button_style = if controller.is_enabled() {
        Style::default()
            .fg(Color::Black)
            .bg(Color::Magenta)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::DarkGray).add_modifier(Modifier::DIM)
    };

    let mut lines = vec![
        Line::from(vec![
            Span::raw("Status: "),
            Span::styled(line.status.label(), status_style(line.status)),
        ]),
        Line::from(Span::styled(
            line.hint.clone(),
            Style::default().fg(Color::Gray).add_modifier(Modifier::ITALIC),
        )),
        Line::from(Span::styled(
            controller.stream_url().unwrap_or("-").to_string(),
            Style::default().fg(Color::DarkGray),
        )),
        Line::from(""),
        Line::from(Span::styled(
            button_text(controller.shows_pause(), controller.is_loading(), ui_state.frame),
            button_style,
        )),
        Line::from(""),
        Line::from(vec![
            if volume_recently_changed {
                Span::styled("🔊 ", Style::default().fg(Color::Yellow))
            } else {
                Span::raw("")
            },
            Span::styled("Volume: ", Style::default().fg(Color::Magenta)),
            Span::styled(
                format!("{:.0}%", volume * 100.0),
                Style::default()
                    .fg(Color::White)
                    .add_modifier(Modifier::BOLD),
            ),
        ]),
        Line::from(generate_pretty_volume_bar(volume)),
        Line::from(""),
        Line::from(Span::styled(
            "♫ Level ♫",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(wave_visual),
        Line::from(""),
        Line::from(Span::styled(
            "─── Controls ───",
            Style::default().fg(Color::Gray).add_modifier(Modifier::DIM),
        )),
    ];

    for (keys, what) in [
        ("Space/Enter", " : play/stop"),
        ("        +/-", " : volume up/down 10%"),
        ("    Up/Down", " : volume up/down 5%"),
        ("          m", " : mute/unmute"),
        ("      q/Esc", " : quit"),
    ] {
        lines.push(Line::from(vec![
            Span::styled(
                keys,
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::raw(what),
        ]));
    }

    lines
}

fn generate_waveform(phase: &mut f32, is_playing: bool, volume: f32) -> String {
    let bar_count = 40;
    let mut rng = rand::thread_rng();

    if is_playing {
        *phase += 0.2;
    } else {
        *phase *= 0.95;
    }

    let mut bars = String::new();

    for i in 0..bar_count {
        let x = i as f32 / bar_count as f32;

        let wave1 = ((*phase + x * 8.0).sin() * 0.3 + 0.5).abs();
        let wave2 = (((*phase * 1.3) + x * 12.0).sin() * 0.2 + 0.5).abs();
        let wave3 = (((*phase * 0.7) + x * 4.0).cos() * 0.3 + 0.5).abs();

        let noise = rng.gen_range(-0.1..0.1);
        let combined = (wave1 + wave2 + wave3) / 3.0 + noise;
        let level = (combined * volume * 16.0).clamp(0.0, 7.0) as u8;

        let final_level = if volume == 0.0 || !is_playing { 0 } else { level };

        bars.push(['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'][final_level as usize]);
    }

    bars
}

fn generate_pretty_volume_bar(volume: f32) -> String {
    let vol_percent = (volume.clamp(0.0, 1.0) * 100.0).round() as usize;
    let bar_length = 20;
    let filled = (vol_percent * bar_length / 100).min(bar_length);

    let mut bar = String::from("│");

    for i in 0..bar_length {
        if i < filled {
            if i < bar_length * 60 / 100 {
                bar.push('▓');
            } else if i < bar_length * 80 / 100 {
                bar.push('▒');
            } else {
                bar.push('░');
            }
        } else {
            bar.push('·');
        }
    }

    bar.push('│');

    if vol_percent == 0 {
        bar.push_str(" 🔇");
    } else if vol_percent < 30 {
        bar.push_str(" 🔈");
    } else if vol_percent < 70 {
        bar.push_str(" 🔉");
    } else {
        bar.push_str(" 🔊");
    }

    bar
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn button_shows_affordance_and_spinner() {
        assert_eq!(button_text(false, false, 0), "[ ▶ 再生 ]");
        assert_eq!(button_text(true, false, 0), "[ ⏸ 停止 ]");
        assert_eq!(button_text(false, true, 1), "[ ▶ 再生 ⠙ ]");
        assert_eq!(button_text(false, true, 11), "[ ▶ 再生 ⠙ ]");
    }

    #[test]
    fn volume_bar_fills_proportionally() {
        let empty = generate_pretty_volume_bar(0.0);
        assert_eq!(empty.chars().filter(|c| *c == '·').count(), 20);
        assert!(empty.ends_with("🔇"));

        let half = generate_pretty_volume_bar(0.5);
        assert_eq!(half.chars().filter(|c| *c == '·').count(), 10);
        assert!(half.ends_with("🔉"));

        let full = generate_pretty_volume_bar(1.0);
        assert_eq!(full.chars().filter(|c| *c == '·').count(), 0);
        assert!(full.ends_with("🔊"));
    }

    #[test]
    fn fresh_state_does_not_flag_recent_volume_change() {
        let state = UIState::new();
        assert!(state.saved_volume.is_none());
        assert!(state.last_volume_change <= Instant::now());
    }

    #[test]
    fn waveform_is_flat_when_not_playing() {
        let mut phase = 1.0;
        let bars = generate_waveform(&mut phase, false, 1.0);
        assert_eq!(bars.chars().count(), 40);
        assert!(bars.chars().all(|c| c == '▁'));
        assert!(phase < 1.0);
    }
}
