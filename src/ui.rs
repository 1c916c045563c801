use std::time::Duration;

use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    symbols::border,
    text::{Line, Span},
    widgets::{BarChart, Block, Cell as TuiCell, Paragraph, Row, Table, Tabs, Wrap},
};

use crate::dispatcher::{Phase, RegionContent};
use crate::domain::HELP_TEXT;
use crate::model::Model;
use crate::resample::TimeBucket;
use crate::router::{FilterControl, RegionId, Tab, TabLayout};
use crate::stats::AggregateStats;
use crate::table::{Cell, RenderedTable};

pub const TABS_HEIGHT: u16 = 3;
pub const FILTER_HEIGHT: u16 = 6;
pub const CHART_HEIGHT: u16 = 10;
pub const STATUSLINE_HEIGHT: u16 = 1;
// Table border and header.
const TABLE_FRAME_HEIGHT: u16 = 3;

/// Rows of the terminal not available to table body rows. The chart pane only
/// takes space on tabs that have one.
pub fn table_reserved_height(has_chart: bool) -> usize {
    let chart = if has_chart { CHART_HEIGHT } else { 0 };
    (TABS_HEIGHT + FILTER_HEIGHT + chart + STATUSLINE_HEIGHT + TABLE_FRAME_HEIGHT) as usize
}
const STATUS_MESSAGE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Default)]
pub struct DashUI {}

impl DashUI {
    pub fn new() -> Self {
        Self {}
    }

    pub fn draw(&mut self, model: &Model, frame: &mut Frame) {
        let has_chart = model.layout().is_some_and(|l| l.chart_region.is_some());
        let [tabs_area, filter_area, chart_area, table_area, status_area] = Layout::vertical([
            Constraint::Length(TABS_HEIGHT),
            Constraint::Length(FILTER_HEIGHT),
            Constraint::Length(if has_chart { CHART_HEIGHT } else { 0 }),
            Constraint::Min(3),
            Constraint::Length(STATUSLINE_HEIGHT),
        ])
        .areas(frame.area());

        self.draw_tabs(model, frame, tabs_area);
        match model.layout() {
            Some(layout) if layout.tab == Tab::Home => {
                self.draw_home(layout, frame, filter_area.union(table_area))
            }
            Some(layout) => {
                self.draw_filters(model, layout, frame, filter_area);
                if let Some(region) = layout.chart_region {
                    self.draw_chart(model.region(region), frame, chart_area);
                }
                if let Some(region) = layout.table_region {
                    self.draw_table(model, region, frame, table_area);
                }
            }
            None => {}
        }
        self.draw_statusline(model, frame, status_area);
    }

    fn draw_tabs(&self, model: &Model, frame: &mut Frame, area: Rect) {
        let titles: Vec<Line> = Tab::ALL
            .iter()
            .enumerate()
            .map(|(i, t)| Line::from(format!(" {} {} ", i + 1, t.label())))
            .collect();
        let tabs = Tabs::new(titles)
            .block(
                Block::bordered()
                    .title(Line::from(" Jobs Dashboard ".bold()).centered())
                    .border_set(border::THICK),
            )
            .select(model.tab().index())
            .highlight_style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD));
        frame.render_widget(tabs, area);
    }

    fn draw_home(&self, layout: &TabLayout, frame: &mut Frame, area: Rect) {
        let heading = layout.heading.unwrap_or_default();
        let text = vec![
            Line::from(heading.bold()),
            Line::from(""),
            Line::from("Boards: latest postings of a job board view."),
            Line::from("Jobs: search job titles, with salary stats and a monthly chart."),
            Line::from("Companies: search postings by company."),
        ];
        frame.render_widget(Paragraph::new(text).block(Block::bordered()), area);
    }

    fn draw_filters(&self, model: &Model, layout: &TabLayout, frame: &mut Frame, area: Rect) {
        let [control_area, info_area] =
            Layout::horizontal([Constraint::Percentage(35), Constraint::Percentage(65)])
                .areas(area);

        let mut lines = Vec::new();
        for filter in &layout.filters {
            match filter {
                FilterControl::Dropdown { id, options, .. } => {
                    let current = model.value(*id);
                    let label = options
                        .iter()
                        .find(|(_, v)| *v == current)
                        .map(|(l, _)| *l)
                        .unwrap_or(current);
                    lines.push(Line::from(vec![
                        "◀ ".dark_gray(),
                        Span::raw(label).bold(),
                        " ▶".dark_gray(),
                    ]));
                }
                FilterControl::TextInput { id, hint } => {
                    lines.push(Line::from((*hint).italic()));
                    let line = match model.editing() {
                        Some((editing, input)) if editing == *id => {
                            Self::input_line(&input.text, input.cursor)
                        }
                        _ => Line::from(vec![
                            "> ".dark_gray(),
                            Span::raw(model.value(*id).to_string()),
                        ]),
                    };
                    lines.push(line);
                }
            }
        }
        if let Some(trigger) = layout.trigger {
            lines.push(Line::from(format!("[ {} ] <Enter>", trigger.label()).cyan()));
        }
        if let Some(err) = model.filter_error() {
            lines.push(Line::from(err.to_string().red()));
        }
        frame.render_widget(
            Paragraph::new(lines).block(Block::bordered().title(" Filter ")),
            control_area,
        );

        match layout.stats_region {
            Some(region) => self.draw_stats(model.region(region), frame, info_area),
            None => {
                let text = Self::phase_line(model.phase());
                frame.render_widget(
                    Paragraph::new(text).block(Block::bordered().title(" Info ")),
                    info_area,
                );
            }
        }
    }

    fn input_line(input: &str, cursor: usize) -> Line<'static> {
        let before: String = input.chars().take(cursor).collect();
        let at: String = input
            .chars()
            .nth(cursor)
            .map(String::from)
            .unwrap_or_else(|| " ".to_string());
        let after: String = input.chars().skip(cursor + 1).collect();
        Line::from(vec![
            "> ".yellow(),
            Span::raw(before),
            Span::raw(at).reversed(),
            Span::raw(after),
        ])
    }

    fn phase_line(phase: Phase) -> Line<'static> {
        match phase {
            Phase::Idle => Line::from("Waiting for input".dark_gray()),
            Phase::Fetching => Line::from("Loading ...".yellow()),
            Phase::Rendered => Line::from("Up to date".green()),
            Phase::Failed => Line::from("Last query failed".red()),
        }
    }

    fn draw_stats(&self, content: &RegionContent, frame: &mut Frame, area: Rect) {
        let cards = Layout::horizontal([Constraint::Ratio(1, 4); 4]).split(area);
        let values: [(&str, String); 4] = match content {
            RegionContent::Stats(AggregateStats {
                total_count,
                salaried_count,
                average_salary,
            }) => [
                ("Total results", total_count.to_string()),
                ("Results with salary", salaried_count.to_string()),
                (
                    "Average salary",
                    average_salary.map_or_else(|| "-".to_string(), |v| format!("{v:.2}")),
                ),
                ("All average", "-".to_string()),
            ],
            other => {
                let text = Self::placeholder(other);
                [
                    ("Total results", text.clone()),
                    ("Results with salary", text.clone()),
                    ("Average salary", text.clone()),
                    ("All average", text),
                ]
            }
        };
        for ((title, value), card) in values.into_iter().zip(cards.iter()) {
            let style = match content {
                RegionContent::Failed(_) => Style::default().fg(Color::Red),
                _ => Style::default().add_modifier(Modifier::BOLD),
            };
            frame.render_widget(
                Paragraph::new(Line::styled(value, style))
                    .centered()
                    .block(Block::bordered().title(format!(" {title} "))),
                *card,
            );
        }
    }

    fn placeholder(content: &RegionContent) -> String {
        match content {
            RegionContent::Loading => "…".to_string(),
            RegionContent::Failed(_) => "error".to_string(),
            _ => String::new(),
        }
    }

    fn draw_chart(&self, content: &RegionContent, frame: &mut Frame, area: Rect) {
        let block = Block::bordered().title(" Postings per month ");
        match content {
            RegionContent::Chart(buckets) if !buckets.is_empty() => {
                let (labels, counts) = Self::chart_series(buckets);
                let data: Vec<(&str, u64)> = labels
                    .iter()
                    .map(String::as_str)
                    .zip(counts)
                    .collect();
                let chart = BarChart::default()
                    .block(block)
                    .data(data.as_slice())
                    .bar_width(7)
                    .bar_gap(1)
                    .bar_style(Style::default().fg(Color::Cyan))
                    .value_style(Style::default().fg(Color::Black).bg(Color::Cyan));
                frame.render_widget(chart, area);
            }
            RegionContent::Chart(_) => frame.render_widget(
                Paragraph::new("Not enough full months in the result".dark_gray()).block(block),
                area,
            ),
            other => self.draw_message(other, block, frame, area),
        }
    }

    // Buckets come newest first, the chart reads left to right.
    fn chart_series(buckets: &[TimeBucket]) -> (Vec<String>, Vec<u64>) {
        buckets
            .iter()
            .rev()
            .map(|b| (b.bucket_start.format("%Y-%m").to_string(), b.count))
            .unzip()
    }

    fn draw_table(&self, model: &Model, region: RegionId, frame: &mut Frame, area: Rect) {
        let content = model.region(region);
        let block = Block::bordered().title(format!(" {} ", region.as_str()));
        let RegionContent::Table(table) = content else {
            self.draw_message(content, block, frame, area);
            return;
        };
        if table.rows.is_empty() {
            frame.render_widget(Paragraph::new("No results".dark_gray()).block(block), area);
            return;
        }

        let height = area.height.saturating_sub(TABLE_FRAME_HEIGHT) as usize;
        let widths = Self::column_widths(table, model.max_column_width());
        let rbegin = model.offset_row();
        let rend = std::cmp::min(rbegin + height, table.rows.len());
        let rows = table.rows[rbegin.min(rend)..rend]
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let cells = row.iter().map(|c| match c {
                    Cell::Plain(s) => TuiCell::from(s.as_str()),
                    Cell::Link { text, .. } => {
                        TuiCell::from(text.as_str()).style(Style::default().fg(Color::Blue).add_modifier(Modifier::UNDERLINED))
                    }
                });
                let r = Row::new(cells);
                if rbegin + i == model.selected_row() {
                    r.style(Style::default().add_modifier(Modifier::REVERSED))
                } else {
                    r
                }
            });
        let header = Row::new(table.headers.iter().map(|h| TuiCell::from(h.as_str().bold())));
        let title = format!(
            " {} [{}/{}] ",
            region.as_str(),
            model.selected_row() + 1,
            table.rows.len()
        );
        frame.render_widget(
            Table::new(rows, widths)
                .header(header)
                .column_spacing(1)
                .block(Block::bordered().title(title)),
            area,
        );
    }

    fn column_widths(table: &RenderedTable, max_column_width: usize) -> Vec<Constraint> {
        table
            .headers
            .iter()
            .enumerate()
            .map(|(idx, h)| {
                let widest = table
                    .rows
                    .iter()
                    .map(|r| r[idx].text().chars().count())
                    .max()
                    .unwrap_or(0);
                let width = std::cmp::min(std::cmp::max(widest, h.len()), max_column_width);
                Constraint::Length(width as u16)
            })
            .collect()
    }

    fn draw_message(&self, content: &RegionContent, block: Block, frame: &mut Frame, area: Rect) {
        let text = match content {
            RegionContent::Loading => Line::from("Loading ...".yellow()),
            RegionContent::Failed(msg) => Line::from(format!("✖ {msg}").red()),
            _ => Line::from(""),
        };
        frame.render_widget(Paragraph::new(text).wrap(Wrap { trim: true }).block(block), area);
    }

    fn draw_statusline(&self, model: &Model, frame: &mut Frame, area: Rect) {
        let [message_area, help_area] =
            Layout::horizontal([Constraint::Fill(1), Constraint::Length(HELP_TEXT.chars().count() as u16)])
                .areas(area);
        let message = if model.last_status_message_update().elapsed() < STATUS_MESSAGE_TIMEOUT {
            model.status_message().to_string()
        } else {
            String::new()
        };
        frame.render_widget(Paragraph::new(message.yellow()), message_area);
        frame.render_widget(Paragraph::new(HELP_TEXT.dark_gray()), help_area);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn chart_reads_oldest_to_newest() {
        let buckets = vec![
            TimeBucket {
                bucket_start: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
                count: 4,
            },
            TimeBucket {
                bucket_start: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
                count: 7,
            },
        ];
        let (labels, counts) = DashUI::chart_series(&buckets);
        assert_eq!(labels, vec!["2024-02", "2024-03"]);
        assert_eq!(counts, vec![7, 4]);
    }

    #[test]
    fn chart_pane_only_reserves_space_when_present() {
        assert_eq!(table_reserved_height(false), 13);
        assert_eq!(table_reserved_height(true), 23);
    }

    #[test]
    fn widths_are_capped() {
        let table = RenderedTable {
            headers: vec!["job_title".into(), "id".into()],
            rows: vec![vec![Cell::Plain("x".repeat(80)), Cell::Plain("1".into())]],
        };
        let widths = DashUI::column_widths(&table, 40);
        assert_eq!(widths, vec![Constraint::Length(40), Constraint::Length(2)]);
    }

    #[test]
    fn input_line_marks_cursor() {
        let line = DashUI::input_line("data", 2);
        let text: Vec<String> = line.spans.iter().map(|s| s.content.to_string()).collect();
        assert_eq!(text, vec!["> ", "da", "t", "a"]);
    }
}
