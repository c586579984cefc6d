use crate::client::AppSnapshot;
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use crossterm::{
    event::{
        self,
        Event,
        KeyCode,
        KeyEvent,
        KeyEventKind,
        KeyModifiers,
    },
    terminal::{
        disable_raw_mode,
        enable_raw_mode,
    },
};
use koin_toss::{
    GameResult,
    Side,
    amount::{
        format_eth,
        parse_amount,
    },
    coins::{
        Banner,
        CoinView,
    },
    encoding::short_hex,
    options::LoadProgress,
};
use ratatui::{
    prelude::*,
    widgets::*,
};
use std::io::stdout;
use tokio::sync::mpsc;

pub type InputEventReceiver = mpsc::UnboundedReceiver<std::io::Result<Event>>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UserEvent {
    Quit,
    Redraw,
    SelectSide(Side),
    ToggleSide,
    MoreCoins,
    FewerCoins,
    MoreMinHeads,
    FewerMinHeads,
    SetAmount(u64),
    HalveAmount,
    DoubleAmount,
    Flip,
    ToggleAnimation,
    ToggleAutoFlip,
    MoreAutoFlips,
    FewerAutoFlips,
    DismissAlert,
}

#[derive(Debug, Default)]
pub struct UiState {
    mode: Mode,
    alert_open: bool,
    terminal: Option<Terminal<CrosstermBackend<std::io::Stdout>>>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
enum Mode {
    #[default]
    Normal,
    BetModal(BetState),
    QuitModal,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct BetState {
    input: String,
    error: Option<String>,
}

pub fn terminal_enter(state: &mut UiState) -> Result<()> {
    enable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::EnterAlternateScreen)?;
    // Single persistent Terminal keeps buffers across draws
    let backend = CrosstermBackend::new(stdout());
    let terminal = Terminal::new(backend)?;
    state.terminal = Some(terminal);
    Ok(())
}

pub fn terminal_exit() -> Result<()> {
    disable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::LeaveAlternateScreen)?;
    Ok(())
}

/// Forwards blocking terminal reads from a dedicated thread.
pub fn input_event_stream() -> InputEventReceiver {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        loop {
            let event = event::read();
            let failed = event.is_err();
            if tx.send(event).is_err() || failed {
                break;
            }
        }
    });
    rx
}

pub async fn next_raw_event(input_events: &mut InputEventReceiver) -> Result<Event> {
    match input_events.recv().await {
        Some(event) => event.wrap_err("Failed to read terminal event"),
        None => Err(eyre!("terminal input stream closed")),
    }
}

pub fn draw(state: &mut UiState, snap: &AppSnapshot) -> Result<()> {
    state.alert_open = snap.alert.is_some();
    if let Some(mut term) = state.terminal.take() {
        term.draw(|f| ui(f, state, snap))?;
        state.terminal = Some(term);
    }
    Ok(())
}

pub fn draw_loading(state: &mut UiState, progress: LoadProgress) -> Result<()> {
    if let Some(mut term) = state.terminal.take() {
        term.draw(|f| {
            f.render_widget(Clear, f.area());
            let area = centered_rect(50, 20, f.area());
            let gauge = Gauge::default()
                .block(
                    Block::default()
                        .borders(Borders::ALL)
                        .title("Loading game options"),
                )
                .gauge_style(Style::default().fg(Color::Yellow))
                .percent(progress.percent())
                .label(format!("{}/{}", progress.done, progress.total));
            f.render_widget(gauge, area);
        })?;
        state.terminal = Some(term);
    }
    Ok(())
}

pub fn interpret_event(state: &mut UiState, event: Event) -> Option<UserEvent> {
    let k = match event {
        Event::Key(k) if k.kind == KeyEventKind::Press => k,
        Event::Resize(_, _) => return Some(UserEvent::Redraw),
        _ => return None,
    };
    if is_ctrl_c(&k) {
        return Some(UserEvent::Quit);
    }

    if state.alert_open {
        return match k.code {
            KeyCode::Enter | KeyCode::Esc | KeyCode::Char(' ') => {
                state.alert_open = false;
                Some(UserEvent::DismissAlert)
            }
            _ => None,
        };
    }

    match &mut state.mode {
        Mode::BetModal(bs) => {
            return match k.code {
                KeyCode::Esc => {
                    state.mode = Mode::Normal;
                    Some(UserEvent::Redraw)
                }
                KeyCode::Enter => match parse_amount(&bs.input) {
                    Ok(amount) => {
                        state.mode = Mode::Normal;
                        Some(UserEvent::SetAmount(amount))
                    }
                    Err(_) => {
                        bs.error = Some("Enter an amount like 0.25".to_string());
                        Some(UserEvent::Redraw)
                    }
                },
                KeyCode::Backspace => {
                    bs.input.pop();
                    bs.error = None;
                    Some(UserEvent::Redraw)
                }
                KeyCode::Char(c) if c.is_ascii_digit() || c == '.' => {
                    bs.input.push(c);
                    bs.error = None;
                    Some(UserEvent::Redraw)
                }
                _ => None,
            };
        }
        Mode::QuitModal => {
            return match k.code {
                KeyCode::Char('y') | KeyCode::Char('Y') => Some(UserEvent::Quit),
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                    state.mode = Mode::Normal;
                    Some(UserEvent::Redraw)
                }
                _ => None,
            };
        }
        Mode::Normal => {}
    }

    Some(match k.code {
        KeyCode::Char('q') | KeyCode::Esc => {
            state.mode = Mode::QuitModal;
            UserEvent::Redraw
        }
        KeyCode::Char('h') => UserEvent::SelectSide(Side::Heads),
        KeyCode::Char('t') => UserEvent::SelectSide(Side::Tails),
        KeyCode::Left | KeyCode::Right => UserEvent::ToggleSide,
        KeyCode::Up | KeyCode::Char('k') => UserEvent::MoreCoins,
        KeyCode::Down | KeyCode::Char('j') => UserEvent::FewerCoins,
        KeyCode::Char('+') | KeyCode::Char('=') => UserEvent::MoreMinHeads,
        KeyCode::Char('-') => UserEvent::FewerMinHeads,
        KeyCode::Char('b') => {
            state.mode = Mode::BetModal(BetState::default());
            UserEvent::Redraw
        }
        KeyCode::Char('/') => UserEvent::HalveAmount,
        KeyCode::Char('*') => UserEvent::DoubleAmount,
        KeyCode::Char('f') | KeyCode::Enter | KeyCode::Char(' ') => UserEvent::Flip,
        KeyCode::Char('a') => UserEvent::ToggleAnimation,
        KeyCode::Char('r') => UserEvent::ToggleAutoFlip,
        KeyCode::Char(']') => UserEvent::MoreAutoFlips,
        KeyCode::Char('[') => UserEvent::FewerAutoFlips,
        _ => return None,
    })
}

fn is_ctrl_c(k: &KeyEvent) -> bool {
    k.code == KeyCode::Char('c') && k.modifiers.contains(KeyModifiers::CONTROL)
}

fn ui(f: &mut Frame, state: &UiState, snap: &AppSnapshot) {
    // Clear the whole frame to avoid leftover fragments
    f.render_widget(Clear, f.area());
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),  // wallet
            Constraint::Length(5),  // game selectors
            Constraint::Length(7),  // coins + banner
            Constraint::Min(8),     // history tables
            Constraint::Length(5),  // status/errors
            Constraint::Length(3),  // help
        ])
        .split(f.area());

    draw_wallet_panel(f, chunks[0], snap);
    draw_game_panel(f, chunks[1], snap);
    draw_coins(f, chunks[2], snap);
    draw_history(f, chunks[3], snap);
    draw_status(f, chunks[4], snap);
    draw_help(f, chunks[5], snap);
    draw_modals(f, state, snap);
}

fn draw_wallet_panel(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let block_text = snap
        .block_height
        .map_or_else(|| String::from("N/A"), |h| h.to_string());
    let text = format!(
        "Network: {} | Wallet: {} | Balance: {} {} | Block: {}",
        snap.network,
        short_hex(*snap.owner),
        format_eth(snap.balance),
        snap.reward_symbol,
        block_text
    );
    let widget =
        Paragraph::new(text).block(Block::default().borders(Borders::ALL).title("Wallet"));
    f.render_widget(widget, area);
}

fn draw_game_panel(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let selected = Style::default()
        .fg(Color::Yellow)
        .add_modifier(Modifier::BOLD);
    let side_span = |side: Side| {
        if snap.selection.side == Some(side) {
            Span::styled(format!("[{side}]"), selected)
        } else {
            Span::styled(format!(" {side} "), Style::default().fg(Color::DarkGray))
        }
    };
    let target = snap.selection.side.unwrap_or(Side::Heads);
    let sides = Line::from(vec![
        Span::raw("Side: "),
        side_span(Side::Heads),
        Span::raw(" "),
        side_span(Side::Tails),
        Span::raw(format!(
            " | Coins: {} | Min {}: {}",
            snap.selection.coin_count, target, snap.selection.min_heads
        )),
    ]);

    let details = &snap.details;
    let odds = if details.game_number.is_none() {
        Line::styled(
            "This coin configuration is not offered",
            Style::default().fg(Color::DarkGray),
        )
    } else {
        let limits = details.limits.map_or_else(String::new, |l| {
            format!(" | Limits: {}-{}", format_eth(l.min), format_eth(l.max))
        });
        let bet_style = if details.betting_disabled {
            Style::default().fg(Color::DarkGray)
        } else {
            Style::default()
        };
        Line::from(vec![
            Span::styled(
                format!("Bet: {} {}", format_eth(snap.selection.amount), snap.reward_symbol),
                bet_style,
            ),
            Span::raw(format!(
                " | Win chance: {:.2}% | Payout: {} {}{}",
                details.win_probability,
                format_eth(details.payout),
                snap.reward_symbol,
                limits
            )),
        ])
    };
    let widget = Paragraph::new(vec![sides, odds, auto_flip_line(snap)])
        .block(Block::default().borders(Borders::ALL).title("Game"));
    f.render_widget(widget, area);
}

fn auto_flip_line(snap: &AppSnapshot) -> Line<'static> {
    let auto = &snap.auto_flip;
    if !auto.enabled() {
        return Line::styled(
            format!("Auto flip: off | Count: {}", auto.count()),
            Style::default().fg(Color::DarkGray),
        );
    }
    let progress = if auto.is_running() {
        format!(" | Flip {}/{}", auto.flips(), auto.count())
    } else {
        String::new()
    };
    let retries = if auto.retries() > 0 {
        format!(" | Retries: {}", auto.retries())
    } else {
        String::new()
    };
    Line::styled(
        format!("Auto flip: on | Count: {}{progress}{retries}", auto.count()),
        Style::default().fg(Color::Yellow),
    )
}

fn draw_coins(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let coins: Vec<Span> = snap
        .coins
        .iter()
        .flat_map(|coin| [coin_span(coin), Span::raw(" ")])
        .collect();
    let mut lines = vec![Line::from(""), Line::from(coins).centered()];
    lines.push(Line::from(""));
    match &snap.banner {
        Some(banner) => {
            let style = match banner {
                Banner::Win { .. } => Style::default()
                    .fg(Color::Green)
                    .add_modifier(Modifier::BOLD),
                Banner::Lose => {
                    Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)
                }
            };
            let mut text = banner.headline().to_string();
            if let Some(detail) = banner.detail() {
                text.push_str("  ");
                text.push_str(&detail);
            }
            lines.push(Line::styled(text, style).centered());
        }
        None if snap.flipping => {
            lines.push(Line::styled("Flipping...", Style::default().fg(Color::Yellow)).centered())
        }
        None => {}
    }
    let widget =
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Coins"));
    f.render_widget(widget, area);
}

fn coin_span(coin: &CoinView) -> Span<'static> {
    let (label, color) = match coin.face {
        Side::Heads => ("(H)", Color::Yellow),
        Side::Tails => ("(T)", Color::Cyan),
    };
    let style = if coin.highlighted {
        Style::default().fg(color).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    Span::styled(label, style)
}

fn draw_history(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let halves = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);
    f.render_widget(history_table("My Games", &snap.my_history, false), halves[0]);
    f.render_widget(history_table("All Games", &snap.all_history, true), halves[1]);
}

fn history_table<'a>(title: &'a str, results: &[GameResult], with_player: bool) -> Table<'a> {
    let mut header = vec!["Time", "Side", "Coins", "Bet", "Result"];
    if with_player {
        header.insert(1, "Player");
    }
    let rows: Vec<Row> = results
        .iter()
        .map(|result| {
            let outcome = if result.won {
                Cell::from(format!("+{}", format_eth(result.reward)))
                    .style(Style::default().fg(Color::Green))
            } else {
                Cell::from("Lose").style(Style::default().fg(Color::Red))
            };
            let mut cells = vec![
                Cell::from(result.timestamp.format("%H:%M:%S").to_string()),
                Cell::from(result.selected_side.label()),
                Cell::from(format!("{}/{}", result.min_heads, result.coin_count)),
                Cell::from(format_eth(result.bet_amount)),
                outcome,
            ];
            if with_player {
                cells.insert(1, Cell::from(short_hex(*result.address)));
            }
            Row::new(cells)
        })
        .collect();
    let widths: Vec<Constraint> = if with_player {
        vec![
            Constraint::Length(9),
            Constraint::Length(12),
            Constraint::Length(6),
            Constraint::Length(6),
            Constraint::Length(8),
            Constraint::Min(6),
        ]
    } else {
        vec![
            Constraint::Length(9),
            Constraint::Length(6),
            Constraint::Length(6),
            Constraint::Length(8),
            Constraint::Min(6),
        ]
    };
    Table::new(rows, widths)
        .header(Row::new(header).style(Style::default().add_modifier(Modifier::BOLD)))
        .block(Block::default().borders(Borders::ALL).title(title))
}

fn draw_status(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let status_widget = if snap.errors.is_empty() {
        let mut lines: Vec<Line> = Vec::new();
        if snap.status.trim().is_empty() {
            lines.push(Line::from("Ready"));
        } else {
            for line in snap.status.lines() {
                lines.push(Line::from(line.to_string()));
            }
        }
        Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title("Status"))
            .style(Style::default().fg(Color::Green))
    } else {
        // newest last, keep what fits
        let lines: Vec<Line> = snap
            .errors
            .iter()
            .rev()
            .take(3)
            .rev()
            .map(|e| Line::from(e.clone()))
            .collect();
        Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title("Errors"))
            .style(Style::default().fg(Color::Red))
    };
    f.render_widget(status_widget, area);
}

fn draw_help(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let animation = if snap.animation { "on" } else { "off" };
    let auto = if snap.auto_flip.enabled() { "on" } else { "off" };
    let help = Paragraph::new(format!(
        "h/t side | ←/→ swap | ↑/↓ coins | +/- min | b bet | / half | * double | f flip | r auto ({auto}) | [/] count | a animation ({animation}) | q quit"
    ))
    .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(help, area);
}

fn draw_modals(f: &mut Frame, state: &UiState, snap: &AppSnapshot) {
    if let Some(alert) = &snap.alert {
        let area = centered_rect(50, 25, f.area());
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Red))
            .title("Alert");
        let p = Paragraph::new(format!("{alert}\n\nEnter to dismiss")).wrap(Wrap { trim: true });
        f.render_widget(Clear, area);
        f.render_widget(block.clone(), area);
        f.render_widget(p, block.inner(area));
        return;
    }
    match &state.mode {
        Mode::BetModal(bs) => {
            let area = centered_rect(40, 25, f.area());
            let block = Block::default().borders(Borders::ALL).title("Bet Amount");
            let mut lines = vec![
                Line::from(format!("Amount: {}_ {}", bs.input, snap.reward_symbol)),
                Line::from("Enter=confirm Esc=cancel, up to 2 decimals"),
            ];
            if let Some(error) = &bs.error {
                lines.push(Line::styled(error.clone(), Style::default().fg(Color::Red)));
            }
            f.render_widget(Clear, area);
            f.render_widget(block.clone(), area);
            f.render_widget(Paragraph::new(lines), block.inner(area));
        }
        Mode::QuitModal => {
            let area = centered_rect(40, 20, f.area());
            let block = Block::default().borders(Borders::ALL).title("Confirm Quit");
            let text = if snap.flipping {
                "A flip is still pending. Quit anyway? (Y/N)"
            } else {
                "Quit the game? (Y/N)"
            };
            f.render_widget(Clear, area);
            f.render_widget(block.clone(), area);
            f.render_widget(Paragraph::new(text), block.inner(area));
        }
        Mode::Normal => {}
    }
}

fn centered_rect(w_percent: u16, h_percent: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - h_percent) / 2),
            Constraint::Percentage(h_percent),
            Constraint::Percentage((100 - h_percent) / 2),
        ])
        .split(r);

    let vertical = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - w_percent) / 2),
            Constraint::Percentage(w_percent),
            Constraint::Percentage((100 - w_percent) / 2),
        ])
        .split(popup_layout[1]);

    vertical[1]
}
