//! Terminal user interface for the recording session.
//!
//! A thin consumer of the session's render frames: draws the level bars with
//! a sparkline, shows elapsed times and state in a footer, and maps key
//! presses to session inputs. All control logic lives in the session; this
//! module only renders and translates input.

use crossterm::{
    event::{self, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    prelude::*,
    style::{Color, Style},
    widgets::Sparkline,
};
use std::error::Error;
use std::io::{stdout, Stdout};
use std::time::Duration;

use crate::session::{format_time, RenderFrame};

/// User input command during a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    /// No relevant key pressed
    Continue,
    /// Primary control press (Space)
    Press,
    /// Delete the current recording (d)
    Delete,
    /// Submit the current recording (Enter)
    Submit,
    /// Exit the session (Escape or 'q')
    Quit,
}

/// Terminal UI for the recording session.
pub struct SessionTui {
    terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl SessionTui {
    /// Creates a new TUI instance and enters alternate screen mode.
    ///
    /// # Errors
    /// - If terminal cannot be initialized
    /// - If raw mode cannot be enabled
    pub fn new() -> Result<Self, Box<dyn Error>> {
        enable_raw_mode()?;
        let mut stdout = stdout();
        execute!(stdout, crossterm::terminal::EnterAlternateScreen)?;

        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend)?;

        Ok(SessionTui { terminal })
    }

    /// Renders one frame of the session state.
    ///
    /// # Errors
    /// - If terminal rendering fails
    pub fn render(&mut self, frame: &RenderFrame, can_submit: bool) -> Result<(), Box<dyn Error>> {
        let bars: Vec<u64> = frame
            .levels
            .iter()
            .map(|&v| (v.clamp(0.0, 1.0) * 100.0) as u64)
            .collect();

        let status = status_line(frame, can_submit);
        let playback_progress = frame.playback_progress;
        let dim_waveform = frame.is_processing;

        self.terminal.draw(|f| {
            let area = f.area();
            let footer_height = 2;

            let wave_area = Rect {
                x: area.x,
                y: area.y,
                width: area.width,
                height: area.height.saturating_sub(footer_height),
            };

            // Played portion tinted differently from the rest of the bars.
            let split = (wave_area.width as f32 * playback_progress) as u16;
            let (played_area, rest_area) = split_at(wave_area, split);

            let resampled = fit_to_width(&bars, wave_area.width as usize);

            let fg = if dim_waveform {
                Color::Rgb(90, 90, 90)
            } else {
                Color::Rgb(206, 224, 220)
            };

            if played_area.width > 0 {
                let played: Vec<u64> =
                    resampled[..played_area.width as usize].to_vec();
                let played_sparkline = Sparkline::default()
                    .data(&played)
                    .max(100)
                    .style(Style::default().bg(Color::Rgb(0, 0, 0)).fg(Color::Rgb(186, 148, 255)));
                f.render_widget(played_sparkline, played_area);
            }
            if rest_area.width > 0 {
                let rest: Vec<u64> =
                    resampled[played_area.width as usize..].to_vec();
                let rest_sparkline = Sparkline::default()
                    .data(&rest)
                    .max(100)
                    .style(Style::default().bg(Color::Rgb(0, 0, 0)).fg(fg));
                f.render_widget(rest_sparkline, rest_area);
            }

            let footer_area = Rect {
                x: area.x,
                y: area.y + area.height.saturating_sub(footer_height),
                width: area.width,
                height: footer_height,
            };

            let footer = ratatui::widgets::Paragraph::new(status).style(
                Style::default()
                    .fg(Color::Rgb(185, 207, 212))
                    .bg(Color::Rgb(0, 0, 0)),
            );
            f.render_widget(footer, footer_area);
        })?;

        Ok(())
    }

    /// Processes user input and returns the appropriate session command.
    ///
    /// # Errors
    /// - If event polling fails
    pub fn handle_input(&mut self) -> Result<SessionCommand, Box<dyn Error>> {
        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                return Ok(match key.code {
                    KeyCode::Char(' ') => {
                        tracing::debug!("Space pressed: primary control");
                        SessionCommand::Press
                    }
                    KeyCode::Char('d') => {
                        tracing::debug!("'d' pressed: delete recording");
                        SessionCommand::Delete
                    }
                    KeyCode::Enter => {
                        tracing::debug!("Enter pressed: submit recording");
                        SessionCommand::Submit
                    }
                    KeyCode::Char('q') | KeyCode::Esc => {
                        tracing::debug!("Escape or 'q' pressed: exiting session");
                        SessionCommand::Quit
                    }
                    KeyCode::Char('c')
                        if key
                            .modifiers
                            .contains(crossterm::event::KeyModifiers::CONTROL) =>
                    {
                        SessionCommand::Quit
                    }
                    _ => SessionCommand::Continue,
                });
            }
        }
        Ok(SessionCommand::Continue)
    }

    /// Cleans up terminal state and exits alternate screen mode.
    ///
    /// # Errors
    /// - If terminal mode cannot be disabled
    pub fn cleanup(&mut self) -> Result<(), Box<dyn Error>> {
        disable_raw_mode()?;
        execute!(
            self.terminal.backend_mut(),
            crossterm::terminal::LeaveAlternateScreen
        )?;
        self.terminal.show_cursor()?;
        Ok(())
    }
}

impl Drop for SessionTui {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}

/// Builds the two-line footer text for a frame.
fn status_line(frame: &RenderFrame, can_submit: bool) -> Text<'static> {
    let indicator = if frame.is_recording {
        Span::styled("● REC ", Style::default().fg(Color::Red))
    } else if frame.is_processing {
        Span::styled("… processing ", Style::default().fg(Color::Yellow))
    } else if frame.is_playing {
        Span::styled("▶ ", Style::default().fg(Color::Green))
    } else if frame.is_paused {
        Span::styled("⏸ ", Style::default().fg(Color::Yellow))
    } else {
        Span::raw("  ")
    };

    let times = if frame.is_playing || frame.is_paused {
        format!(
            "{} / {}",
            format_time(frame.elapsed_playback_secs),
            format_time(frame.elapsed_record_secs)
        )
    } else {
        format_time(frame.elapsed_record_secs)
    };

    let submit_hint = if can_submit {
        Span::styled("Enter submit  ", Style::default().fg(Color::White))
    } else {
        Span::styled("Enter submit  ", Style::default().fg(Color::DarkGray))
    };

    Text::from(vec![
        Line::from(vec![indicator, Span::raw(times)]),
        Line::from(vec![
            Span::raw("Space record/stop/play/pause  "),
            Span::raw("d delete  "),
            submit_hint,
            Span::raw("q quit"),
        ]),
    ])
}

/// Splits an area into a left part of `width` columns and the remainder.
fn split_at(area: Rect, width: u16) -> (Rect, Rect) {
    let width = width.min(area.width);
    let left = Rect {
        x: area.x,
        y: area.y,
        width,
        height: area.height,
    };
    let right = Rect {
        x: area.x + width,
        y: area.y,
        width: area.width - width,
        height: area.height,
    };
    (left, right)
}

/// Resamples bar values to exactly `width` columns for display.
///
/// Nearest-neighbor is fine here; the numerically faithful reduction already
/// happened upstream.
fn fit_to_width(bars: &[u64], width: usize) -> Vec<u64> {
    if width == 0 {
        return Vec::new();
    }
    if bars.is_empty() {
        return vec![0; width];
    }
    (0..width)
        .map(|i| bars[i * bars.len() / width])
        .collect()
}
