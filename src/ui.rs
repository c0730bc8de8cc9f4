use anyhow::Result;
use cfem_choropleth::{
    aggregate, default_selection, filter, municipality_options, substance_options, year_options,
    AggregatedRecord, CurrencyFormat, DashboardConfig, DistributionRecord, FilterSelection, Money,
    StateTotalsChart, TimeSeriesChart, NO_MUNICIPALITY_LABEL, NO_SUBSTANCE_LABEL, NO_YEAR_LABEL,
};
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{
        Axis, Bar, BarChart, BarGroup, Block, Borders, Cell, Chart, Dataset, GraphType, List,
        ListItem, ListState, Paragraph, Row, Table, TableState,
    },
    Frame, Terminal,
};
use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    StateTotals,
    TimeSeries,
    Rows,
}

impl Page {
    pub fn next(&self) -> Self {
        match self {
            Page::StateTotals => Page::TimeSeries,
            Page::TimeSeries => Page::Rows,
            Page::Rows => Page::StateTotals,
        }
    }

    pub fn previous(&self) -> Self {
        match self {
            Page::StateTotals => Page::Rows,
            Page::TimeSeries => Page::StateTotals,
            Page::Rows => Page::TimeSeries,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Page::StateTotals => "Por estado",
            Page::TimeSeries => "Série temporal",
            Page::Rows => "Municípios",
        }
    }
}

/// Which selector the arrow keys move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector {
    Substance,
    Year,
    Municipality,
}

impl Selector {
    fn next(&self) -> Self {
        match self {
            Selector::Substance => Selector::Year,
            Selector::Year => Selector::Municipality,
            Selector::Municipality => Selector::Substance,
        }
    }

    fn previous(&self) -> Self {
        match self {
            Selector::Substance => Selector::Municipality,
            Selector::Year => Selector::Substance,
            Selector::Municipality => Selector::Year,
        }
    }
}

// List index 0 is always the "none selected" placeholder
fn chosen<T: Clone>(state: &ListState, options: &[T]) -> Option<T> {
    state
        .selected()
        .and_then(|i| i.checked_sub(1))
        .and_then(|i| options.get(i))
        .cloned()
}

fn position_of<T: PartialEq>(options: &[T], value: Option<&T>) -> usize {
    value
        .and_then(|v| options.iter().position(|o| o == v))
        .map(|i| i + 1)
        .unwrap_or(0)
}

fn step(state: &mut ListState, len_with_placeholder: usize, forward: bool) {
    let i = state.selected().unwrap_or(0);
    let next = if forward {
        if i + 1 >= len_with_placeholder { 0 } else { i + 1 }
    } else if i == 0 {
        len_with_placeholder - 1
    } else {
        i - 1
    };
    state.select(Some(next));
}

pub struct App {
    records: Vec<DistributionRecord>,
    currency: CurrencyFormat,
    pub substances: Vec<String>,
    pub years: Vec<i32>,
    pub municipalities: Vec<String>,
    pub substance_state: ListState,
    pub year_state: ListState,
    pub municipality_state: ListState,
    pub table_state: TableState,
    pub focus: Selector,
    pub current_page: Page,
    pub filtered: Vec<AggregatedRecord>,
    pub state_chart: StateTotalsChart,
    pub time_series: TimeSeriesChart,
}

impl App {
    pub fn new(records: Vec<DistributionRecord>, config: &DashboardConfig) -> Self {
        let initial = default_selection(&records, config);
        let substances = substance_options(&records);
        let years = year_options(&records);
        let currency = config.currency_format().unwrap_or_default();

        let substance_state = ListState::default()
            .with_selected(Some(position_of(&substances, initial.substance.as_ref())));
        let year_state = ListState::default()
            .with_selected(Some(position_of(&years, initial.year.as_ref())));

        let mut app = Self {
            state_chart: StateTotalsChart::render(&[], None, None, &currency),
            time_series: TimeSeriesChart::render(None, None, &[], &currency),
            records,
            currency,
            substances,
            years,
            municipalities: Vec::new(),
            substance_state,
            year_state,
            municipality_state: ListState::default().with_selected(Some(0)),
            table_state: TableState::default(),
            focus: Selector::Substance,
            current_page: Page::StateTotals,
            filtered: Vec::new(),
        };
        app.refresh();
        app
    }

    pub fn selection(&self) -> FilterSelection {
        FilterSelection {
            year: chosen(&self.year_state, &self.years),
            substance: chosen(&self.substance_state, &self.substances),
            municipality: chosen(&self.municipality_state, &self.municipalities),
        }
    }

    /// Full recompute from the cached records, as on every interaction
    pub fn refresh(&mut self) {
        let previous_municipality = self.selection().municipality;

        let aggregated = aggregate(&self.records);
        let selection = self.selection();
        self.filtered = filter(&aggregated, selection.year, selection.substance());

        self.municipalities = municipality_options(&self.filtered);
        self.municipality_state.select(Some(position_of(
            &self.municipalities,
            previous_municipality.as_ref(),
        )));

        let selection = self.selection();
        self.state_chart = StateTotalsChart::render(
            &self.filtered,
            selection.year,
            selection.substance(),
            &self.currency,
        );
        self.time_series = TimeSeriesChart::render(
            selection.municipality(),
            selection.substance(),
            &aggregated,
            &self.currency,
        );

        self.table_state
            .select(if self.filtered.is_empty() { None } else { Some(0) });
    }

    pub fn move_selection(&mut self, forward: bool) {
        match self.focus {
            Selector::Substance => step(&mut self.substance_state, self.substances.len() + 1, forward),
            Selector::Year => step(&mut self.year_state, self.years.len() + 1, forward),
            Selector::Municipality => {
                step(&mut self.municipality_state, self.municipalities.len() + 1, forward)
            }
        }
        self.refresh();
    }

    pub fn next_page(&mut self) {
        self.current_page = self.current_page.next();
    }

    pub fn previous_page(&mut self) {
        self.current_page = self.current_page.previous();
    }

    pub fn scroll_rows(&mut self, delta: isize) {
        let len = self.filtered.len();
        if len == 0 {
            return;
        }
        let current = self.table_state.selected().unwrap_or(0) as isize;
        let next = (current + delta).clamp(0, len as isize - 1);
        self.table_state.select(Some(next as usize));
    }
}

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("Error: {:?}", err);
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Tab => app.next_page(),
                KeyCode::BackTab => app.previous_page(),
                KeyCode::Right | KeyCode::Char('l') => app.focus = app.focus.next(),
                KeyCode::Left | KeyCode::Char('h') => app.focus = app.focus.previous(),
                KeyCode::Down | KeyCode::Char('j') => app.move_selection(true),
                KeyCode::Up | KeyCode::Char('k') => app.move_selection(false),
                KeyCode::PageDown => app.scroll_rows(20),
                KeyCode::PageUp => app.scroll_rows(-20),
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => return Ok(()),
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header with navigation
            Constraint::Min(0),    // Selectors + content
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(30), Constraint::Percentage(70)])
        .split(chunks[1]);

    render_selectors(f, body[0], app);

    match app.current_page {
        Page::StateTotals => render_state_chart(f, body[1], app),
        Page::TimeSeries => render_time_series(f, body[1], app),
        Page::Rows => render_rows(f, body[1], app),
    }

    render_status_bar(f, chunks[2], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let pages = [Page::StateTotals, Page::TimeSeries, Page::Rows];

    let mut tab_spans = vec![];
    for (i, page) in pages.iter().enumerate() {
        if i > 0 {
            tab_spans.push(Span::raw(" │ "));
        }

        let style = if *page == app.current_page {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };

        tab_spans.push(Span::styled(page.title().to_string(), style));
    }

    let total: Money = app.filtered.iter().map(|r| r.total_value).sum();
    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(
        format!("Linhas: {}", app.filtered.len()),
        Style::default().fg(Color::White),
    ));
    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(
        format!("Total: {}", app.currency.format(total)),
        Style::default().fg(Color::Green),
    ));

    let header = Paragraph::new(vec![Line::from(tab_spans)])
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));

    f.render_widget(header, area);
}

fn selector_list<'a>(title: &'a str, placeholder: &'a str, options: Vec<String>, focused: bool) -> List<'a> {
    let items: Vec<ListItem> = std::iter::once(placeholder.to_string())
        .chain(options)
        .map(ListItem::new)
        .collect();

    let border = if focused { Color::Yellow } else { Color::White };

    List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(border))
                .title(title),
        )
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol("→ ")
}

fn render_selectors(f: &mut Frame, area: Rect, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(40),
            Constraint::Percentage(20),
            Constraint::Percentage(40),
        ])
        .split(area);

    let substances = selector_list(
        " Substância ",
        NO_SUBSTANCE_LABEL,
        app.substances.clone(),
        app.focus == Selector::Substance,
    );
    f.render_stateful_widget(substances, chunks[0], &mut app.substance_state);

    let years = selector_list(
        " Ano ",
        NO_YEAR_LABEL,
        app.years.iter().map(|y| y.to_string()).collect(),
        app.focus == Selector::Year,
    );
    f.render_stateful_widget(years, chunks[1], &mut app.year_state);

    let municipalities = selector_list(
        " Município ",
        NO_MUNICIPALITY_LABEL,
        app.municipalities.clone(),
        app.focus == Selector::Municipality,
    );
    f.render_stateful_widget(municipalities, chunks[2], &mut app.municipality_state);
}

fn render_state_chart(f: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" {} ", app.state_chart.title));

    if app.state_chart.is_empty() {
        f.render_widget(Paragraph::new("Sem dados para a seleção atual").block(block), area);
        return;
    }

    let bars: Vec<Bar> = app
        .state_chart
        .bars
        .iter()
        .map(|b| {
            Bar::default()
                .label(Line::from(b.state_code.clone()))
                .value((b.total.cents().max(0) / 100) as u64)
                .text_value(b.label.clone())
        })
        .collect();

    let chart = BarChart::default()
        .block(block)
        .data(BarGroup::default().bars(&bars))
        .bar_width(14)
        .bar_gap(1)
        .bar_style(Style::default().fg(Color::Green))
        .value_style(Style::default().fg(Color::Black).bg(Color::Green));

    f.render_widget(chart, area);
}

fn render_time_series(f: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" {} ", app.time_series.title));

    if app.time_series.is_empty() {
        f.render_widget(Paragraph::new("Selecione um município").block(block), area);
        return;
    }

    let points: Vec<(f64, f64)> = app
        .time_series
        .points
        .iter()
        .map(|p| (p.year as f64, p.value.as_f64()))
        .collect();

    let first_year = points.first().map(|p| p.0).unwrap_or(0.0);
    let last_year = points.last().map(|p| p.0).unwrap_or(0.0);
    let (x_min, x_max) = if first_year == last_year {
        (first_year - 1.0, last_year + 1.0)
    } else {
        (first_year, last_year)
    };
    let y_max = points.iter().map(|p| p.1).fold(0.0_f64, f64::max) * 1.1;
    let y_min = points.iter().map(|p| p.1).fold(0.0_f64, f64::min);

    let dataset = Dataset::default()
        .name("CFEM")
        .marker(symbols::Marker::Braille)
        .graph_type(GraphType::Line)
        .style(Style::default().fg(Color::Gray))
        .data(&points);

    let y_label = |v: f64| Span::raw(format!("{:.0}", v));

    let chart = Chart::new(vec![dataset])
        .block(block)
        .x_axis(
            Axis::default()
                .title("Ano")
                .bounds([x_min, x_max])
                .labels(vec![
                    Span::raw(format!("{:.0}", x_min)),
                    Span::raw(format!("{:.0}", x_max)),
                ]),
        )
        .y_axis(
            Axis::default()
                .title("Valor da CFEM")
                .bounds([y_min, y_max.max(1.0)])
                .labels(vec![y_label(y_min), y_label(y_max.max(1.0))]),
        );

    f.render_widget(chart, area);
}

fn render_rows(f: &mut Frame, area: Rect, app: &mut App) {
    let header_cells = ["Município", "UF", "Ano", "Substância", "Valor"]
        .iter()
        .map(|h| {
            Cell::from(*h).style(
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            )
        });

    let header = Row::new(header_cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1);

    let currency = &app.currency;
    let rows = app.filtered.iter().map(|r| {
        let color = if r.total_value.cents() < 0 { Color::Red } else { Color::Green };

        Row::new(vec![
            Cell::from(r.entity_name.clone()),
            Cell::from(r.state_code.clone()),
            Cell::from(r.year.to_string()),
            Cell::from(r.substance.clone()),
            Cell::from(currency.format(r.total_value)).style(Style::default().fg(color)),
        ])
        .height(1)
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(32),
            Constraint::Length(4),
            Constraint::Length(6),
            Constraint::Length(24),
            Constraint::Length(22),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Linhas filtradas "),
    )
    .highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.table_state);
}

fn render_status_bar(f: &mut Frame, area: Rect, _app: &App) {
    let key = |k: &'static str| Span::styled(k, Style::default().fg(Color::Yellow));

    let status_spans = vec![
        key("←/→"),
        Span::raw(" Seletor | "),
        key("↑/↓"),
        Span::raw(" Opção | "),
        key("Tab"),
        Span::raw(" Página | "),
        key("PgUp/PgDn"),
        Span::raw(" Linhas | "),
        key("q"),
        Span::raw(" Sair"),
    ];

    let status_bar = Paragraph::new(Line::from(status_spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray)),
    );

    f.render_widget(status_bar, area);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records() -> Vec<DistributionRecord> {
        vec![
            DistributionRecord::new(2020, "OURO", Money::from_cents(100), "ITABIRA", "MG"),
            DistributionRecord::new(2021, "OURO", Money::from_cents(200), "ITABIRA", "MG"),
            DistributionRecord::new(2021, "FERRO", Money::from_cents(300), "PARAUAPEBAS", "PA"),
        ]
    }

    #[test]
    fn test_app_starts_at_latest_year_without_substance() {
        let app = App::new(records(), &DashboardConfig::default());
        let selection = app.selection();

        assert_eq!(selection.year, Some(2021));
        assert_eq!(selection.substance, None);
        assert!(app.filtered.is_empty());
        assert!(app.state_chart.is_empty());
    }

    #[test]
    fn test_moving_substance_refilters() {
        let mut app = App::new(records(), &DashboardConfig::default());
        app.focus = Selector::Substance;
        app.move_selection(true); // FERRO

        assert_eq!(app.selection().substance.as_deref(), Some("FERRO"));
        assert_eq!(app.municipalities, vec!["PARAUAPEBAS"]);
        assert_eq!(app.state_chart.bars.len(), 1);

        app.focus = Selector::Municipality;
        app.move_selection(true);
        assert_eq!(app.selection().municipality.as_deref(), Some("PARAUAPEBAS"));
        assert_eq!(app.time_series.points.len(), 1);
    }

    #[test]
    fn test_selection_wraps_to_placeholder() {
        let mut app = App::new(records(), &DashboardConfig::default());
        app.focus = Selector::Year;
        app.move_selection(true); // past the last year
        assert_eq!(app.selection().year, None);
    }
}
