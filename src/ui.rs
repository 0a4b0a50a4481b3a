use std::time::Instant;

use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Paragraph, Widget},
};
use unicode_width::UnicodeWidthStr;

use crate::results::SubmissionPayload;
use crate::session::SessionController;
use crate::tracker::CharClass;

const HORIZONTAL_MARGIN: u16 = 5;
const VERTICAL_MARGIN: u16 = 1;

/// Snapshot of a session for one frame.
pub struct TypingView<'a> {
    pub session: &'a SessionController,
    pub now: Instant,
    /// Earlier results of the signed-in user, newest first.
    pub history: &'a [SubmissionPayload],
}

impl<'a> TypingView<'a> {
    pub fn new(session: &'a SessionController, now: Instant) -> Self {
        Self {
            session,
            now,
            history: &[],
        }
    }

    pub fn with_history(mut self, history: &'a [SubmissionPayload]) -> Self {
        self.history = history;
        self
    }
}

impl Widget for TypingView<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let session = self.session;

        // styles
        let bold_style = Style::default().add_modifier(Modifier::BOLD);
        let green_bold_style = Style::default().patch(bold_style).fg(Color::Green);
        let red_bold_style = Style::default().patch(bold_style).fg(Color::Red);
        let dim_bold_style = Style::default()
            .patch(bold_style)
            .add_modifier(Modifier::DIM);
        let underlined_dim_bold_style = Style::default()
            .patch(dim_bold_style)
            .add_modifier(Modifier::UNDERLINED);
        let italic_style = Style::default().add_modifier(Modifier::ITALIC);

        let preview_count = session.config().visible_lines.saturating_sub(1) as u16;
        let result_lines = if session.is_complete() { 3 } else { 0 };

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .horizontal_margin(HORIZONTAL_MARGIN)
            .vertical_margin(VERTICAL_MARGIN)
            .constraints([
                Constraint::Length(1),             // language + timer
                Constraint::Length(1),             // sign-in hint
                Constraint::Min(0),                // padding
                Constraint::Length(1),             // active line
                Constraint::Length(preview_count), // upcoming lines
                Constraint::Min(0),                // padding
                Constraint::Length(1),             // live stats
                Constraint::Length(result_lines),  // final results
                Constraint::Length(1),             // legend
            ])
            .split(area);

        let header = Paragraph::new(Line::from(vec![
            Span::styled(
                format!("{} ({})", session.language().label(), session.language()),
                bold_style,
            ),
            Span::raw("   "),
            Span::styled(
                format!("⏳ {}s", session.remaining_secs(self.now)),
                dim_bold_style,
            ),
        ]))
        .alignment(Alignment::Center);
        header.render(chunks[0], buf);

        if !session.is_signed_in() {
            Paragraph::new(Span::styled(
                "not signed in: results will not be saved",
                Style::default().fg(Color::Red).add_modifier(Modifier::ITALIC),
            ))
            .alignment(Alignment::Center)
            .render(chunks[1], buf);
        }

        let mut lines = session.visible_lines();
        match lines.next() {
            Some(active) => {
                let spans: Vec<Span> = session
                    .active_classes()
                    .into_iter()
                    .map(|(expected, class)| match class {
                        CharClass::Correct => Span::styled(expected.to_string(), green_bold_style),
                        CharClass::Incorrect => Span::styled(
                            match expected {
                                ' ' => "·".to_owned(),
                                c => c.to_string(),
                            },
                            red_bold_style,
                        ),
                        CharClass::Cursor => {
                            Span::styled(expected.to_string(), underlined_dim_bold_style)
                        }
                        CharClass::Pending => Span::styled(expected.to_string(), dim_bold_style),
                    })
                    .collect();

                Paragraph::new(Line::from(spans))
                    .alignment(alignment_for(&active.text, chunks[3].width))
                    .render(chunks[3], buf);
            }
            None => {
                let placeholder = if session.is_fetching() {
                    "loading text…"
                } else {
                    "no text available, press a key to retry"
                };
                Paragraph::new(Span::styled(placeholder, italic_style))
                    .alignment(Alignment::Center)
                    .render(chunks[3], buf);
            }
        }

        let upcoming: Vec<Line> = lines
            .enumerate()
            .map(|(idx, line)| {
                // emphasis fades with distance from the active line
                let style = if idx == 0 {
                    Style::default().fg(Color::Gray)
                } else {
                    Style::default().fg(Color::DarkGray).add_modifier(Modifier::DIM)
                };
                Line::from(Span::styled(line.text.clone(), style))
                    .alignment(alignment_for(&line.text, chunks[4].width))
            })
            .collect();
        Paragraph::new(upcoming).render(chunks[4], buf);

        let stats = session.stats();
        Paragraph::new(Span::styled(
            format!(
                "{} wpm   {}% acc   {}s elapsed",
                stats.wpm,
                stats.accuracy,
                session.elapsed_secs(self.now)
            ),
            bold_style,
        ))
        .alignment(Alignment::Center)
        .render(chunks[6], buf);

        if let Some(result) = session.result() {
            let counters = session.counters();
            let mut summary = vec![
                Line::from(Span::styled(
                    format!(
                        "time's up: {} wpm, {}% accuracy",
                        result.wpm, result.accuracy
                    ),
                    green_bold_style,
                )),
                Line::from(Span::raw(format!(
                    "keystrokes: {} | errors: {}",
                    counters.total_keystrokes, counters.error_count
                ))),
            ];
            if let Some(best) = self.history.iter().map(|r| r.wpm).max() {
                summary.push(Line::from(Span::styled(
                    format!("best of last {}: {} wpm", self.history.len(), best),
                    italic_style,
                )));
            }
            Paragraph::new(summary)
                .alignment(Alignment::Center)
                .render(chunks[7], buf);
        }

        let legend = if session.has_started() && !session.is_complete() {
            "(tab) restart / (esc)ape"
        } else {
            "(tab) restart / (f2) language / (f5) resend / (esc)ape"
        };
        Paragraph::new(Span::styled(legend, italic_style))
            .alignment(Alignment::Center)
            .render(chunks[8], buf);
    }
}

/// Short lines sit centered; lines wider than the area start at the left.
fn alignment_for(text: &str, width: u16) -> Alignment {
    if text.width() <= width as usize {
        Alignment::Center
    } else {
        Alignment::Left
    }
}
