//! UCI protocol front end.
//!
//! One protocol thread owns stdin and this struct; one long-lived worker
//! thread runs searches. Board, searcher and transposition table sit behind
//! a single mutex that the worker holds for the whole of each search, so
//! every mutating command first cancels and waits for `bestmove`.

use crate::board::Board;
use crate::search::{is_mate_score, mate_in_moves, SearchInfo, SearchLimits, SearchResult, Searcher};
use crate::time_control::think_time_ms;
use crate::tpt::TranspositionTable;
use crate::movegen;
use crate::types::*;
use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{mpsc, Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

const ENGINE_NAME: &str = "Minnow";
const ENGINE_AUTHOR: &str = "Minnow authors";
const DEFAULT_HASH_MB: usize = 64;
const MAX_HASH_MB: usize = 1024;

// Why the current search was asked to wind down.
const ABORT_NONE: u8 = 0;
const ABORT_STOP: u8 = 1;
const ABORT_PONDERHIT: u8 = 2;

struct EngineState {
    board: Board,
    searcher: Searcher,
    tt: TranspositionTable,
}

struct SearchJob {
    limits: SearchLimits,
    ponder: bool,
    /// Whether to append `ponder <move>` to the bestmove line.
    announce_ponder: bool,
}

pub struct UciEngine {
    state: Arc<Mutex<EngineState>>,
    stop: Arc<AtomicBool>,
    abort_reason: Arc<AtomicU8>,
    searching: Arc<(Mutex<bool>, Condvar)>,
    /// Result of a ponder search that finished before `ponderhit`/`stop`.
    held_result: Arc<Mutex<Option<SearchResult>>>,
    job_tx: mpsc::Sender<SearchJob>,
    search_id: Arc<AtomicU64>,

    hash_mb: usize,
    ponder_enabled: bool,

    /// Position before the opponent's expected reply, and that reply.
    ponder_fen: Option<String>,
    ponder_move: Option<Move>,
    saved_think_ms: Option<u64>,
    pondering: bool,
}

impl UciEngine {
    pub fn new() -> Self {
        let state = Arc::new(Mutex::new(EngineState {
            board: Board::new(),
            searcher: Searcher::new(),
            tt: TranspositionTable::new_mb(DEFAULT_HASH_MB),
        }));
        let stop = Arc::new(AtomicBool::new(false));
        let abort_reason = Arc::new(AtomicU8::new(ABORT_NONE));
        let searching = Arc::new((Mutex::new(false), Condvar::new()));
        let held_result = Arc::new(Mutex::new(None));
        let (job_tx, job_rx) = mpsc::channel::<SearchJob>();

        {
            let state = Arc::clone(&state);
            let stop = Arc::clone(&stop);
            let abort_reason = Arc::clone(&abort_reason);
            let searching = Arc::clone(&searching);
            let held_result = Arc::clone(&held_result);
            thread::spawn(move || {
                worker_loop(job_rx, state, stop, abort_reason, searching, held_result);
            });
        }

        UciEngine {
            state,
            stop,
            abort_reason,
            searching,
            held_result,
            job_tx,
            search_id: Arc::new(AtomicU64::new(0)),
            hash_mb: DEFAULT_HASH_MB,
            ponder_enabled: false,
            ponder_fen: None,
            ponder_move: None,
            saved_think_ms: None,
            pondering: false,
        }
    }

    pub fn run(&mut self) {
        let stdin = io::stdin();
        let mut lines = stdin.lock().lines();

        while let Some(Ok(line)) = lines.next() {
            if !self.handle_command(line.trim()) {
                break;
            }
        }
        self.cancel_and_wait();
    }

    /// Handle one command line. Returns false on `quit`.
    pub fn handle_command(&mut self, line: &str) -> bool {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some(&command) = parts.first() else {
            return true;
        };

        match command {
            "uci" => self.handle_uci(),
            "isready" => send("readyok"),
            "ucinewgame" => self.handle_new_game(),
            "position" => self.handle_position(&parts[1..]),
            "go" => self.handle_go(&parts[1..]),
            "stop" => self.handle_stop(),
            "ponderhit" => self.handle_ponderhit(),
            "setoption" => self.handle_setoption(&parts[1..]),
            "d" => self.handle_display(),
            "quit" => return false,
            _ => eprintln!("info string unknown command: {line}"),
        }
        true
    }

    fn handle_uci(&self) {
        send(&format!("id name {ENGINE_NAME}"));
        send(&format!("id author {ENGINE_AUTHOR}"));
        send(&format!(
            "option name Hash type spin default {DEFAULT_HASH_MB} min 1 max {MAX_HASH_MB}"
        ));
        send("option name Ponder type check default false");
        send("uciok");
    }

    fn handle_new_game(&mut self) {
        self.cancel_and_wait();
        let mut st = self.state.lock().unwrap();
        st.board = Board::new();
        st.tt.clear();
        st.searcher.clear();
    }

    fn handle_setoption(&mut self, parts: &[&str]) {
        self.cancel_and_wait();

        let mut name = String::new();
        let mut value = String::new();
        let mut target: Option<&mut String> = None;
        for &token in parts {
            match token {
                "name" => target = Some(&mut name),
                "value" => target = Some(&mut value),
                _ => {
                    if let Some(ref mut t) = target {
                        if !t.is_empty() {
                            t.push(' ');
                        }
                        t.push_str(token);
                    }
                }
            }
        }

        match name.to_lowercase().as_str() {
            "hash" => match value.parse::<usize>() {
                Ok(mb) => {
                    self.hash_mb = mb.clamp(1, MAX_HASH_MB);
                    self.state.lock().unwrap().tt.resize_mb(self.hash_mb);
                }
                Err(_) => eprintln!("info string bad Hash value: {value}"),
            },
            "ponder" => self.ponder_enabled = value == "true",
            _ => eprintln!("info string unknown option: {name}"),
        }
    }

    fn handle_position(&mut self, parts: &[&str]) {
        if parts.is_empty() {
            return;
        }
        self.cancel_and_wait();

        let moves_idx = parts.iter().position(|&s| s == "moves");

        let board = if parts[0] == "startpos" {
            Some(Board::new())
        } else if parts[0] == "fen" {
            let end = moves_idx.unwrap_or(parts.len());
            let fen = parts[1..end].join(" ");
            match Board::from_fen(&fen) {
                Ok(board) => Some(board),
                Err(e) => {
                    eprintln!("info string invalid FEN: {e}");
                    None
                }
            }
        } else {
            None
        };
        let Some(mut board) = board else {
            return;
        };

        // Replay moves; the host guarantees legality, so a move that fails
        // to decode just stops the replay.
        if let Some(idx) = moves_idx {
            for move_str in &parts[idx + 1..] {
                match decode_move(&board, move_str) {
                    Some(m) => board.make_move(m, false),
                    None => {
                        eprintln!("info string cannot decode move: {move_str}");
                        break;
                    }
                }
            }
        }

        self.state.lock().unwrap().board = board;
    }

    fn handle_go(&mut self, parts: &[&str]) {
        let mut wtime: Option<u64> = None;
        let mut btime: Option<u64> = None;
        let mut winc: u64 = 0;
        let mut binc: u64 = 0;
        let mut movetime: Option<u64> = None;
        let mut depth: Option<u8> = None;
        let mut infinite = false;
        let mut ponder = false;

        let mut i = 0;
        while i < parts.len() {
            let value = parts.get(i + 1);
            match parts[i] {
                "wtime" => {
                    wtime = value.and_then(|v| v.parse().ok());
                    i += 2;
                }
                "btime" => {
                    btime = value.and_then(|v| v.parse().ok());
                    i += 2;
                }
                "winc" => {
                    winc = value.and_then(|v| v.parse().ok()).unwrap_or(0);
                    i += 2;
                }
                "binc" => {
                    binc = value.and_then(|v| v.parse().ok()).unwrap_or(0);
                    i += 2;
                }
                "movetime" => {
                    movetime = value.and_then(|v| v.parse().ok());
                    i += 2;
                }
                "depth" => {
                    depth = value.and_then(|v| v.parse::<u32>().ok()).map(|d| d.min(255) as u8);
                    i += 2;
                }
                "infinite" => {
                    infinite = true;
                    i += 1;
                }
                "ponder" => {
                    ponder = true;
                    i += 1;
                }
                _ => i += 1,
            }
        }

        self.cancel_and_wait();

        // Work out the clock budget up front; a ponder search saves it for
        // the eventual ponderhit.
        let side = self.state.lock().unwrap().board.side_to_move;
        let think_ms = if let Some(ms) = movetime {
            Some(ms)
        } else if infinite {
            None
        } else {
            let (remaining, increment) = match side {
                Color::White => (wtime, winc),
                Color::Black => (btime, binc),
            };
            remaining.map(|r| think_time_ms(r, increment))
        };

        if ponder {
            // Think on the opponent's time: set the position back one move
            // and remember how to restore it on ponderhit.
            self.pondering = true;
            self.saved_think_ms = think_ms;
            {
                let mut st = self.state.lock().unwrap();
                self.ponder_fen = None;
                self.ponder_move = st.board.move_history.last().copied();
                if let Some(m) = self.ponder_move {
                    st.board.unmake_move(m, false);
                    self.ponder_fen = Some(st.board.to_fen());
                }
            }
            self.start_search(SearchLimits::infinite(), true);
            return;
        }

        self.pondering = false;
        let limits = match (think_ms, depth) {
            (_, Some(d)) => SearchLimits::depth(d),
            (Some(ms), None) => SearchLimits::movetime(ms),
            (None, None) => SearchLimits::infinite(),
        };
        self.start_search(limits, false);
    }

    fn handle_stop(&mut self) {
        self.abort_reason.store(ABORT_STOP, Ordering::SeqCst);
        self.stop.store(true, Ordering::SeqCst);
        self.wait_for_search_end();

        // A ponder search that ran to completion parked its result.
        if let Some(result) = self.held_result.lock().unwrap().take() {
            send_bestmove(&result, self.ponder_enabled);
        }
        self.ponder_fen = None;
        self.ponder_move = None;
        self.pondering = false;
    }

    fn handle_ponderhit(&mut self) {
        if !self.pondering {
            return;
        }
        self.pondering = false;

        // The expected move arrived: drop the speculative search, restore
        // the real position and think with the budget saved at `go ponder`.
        self.abort_reason.store(ABORT_PONDERHIT, Ordering::SeqCst);
        self.stop.store(true, Ordering::SeqCst);
        self.wait_for_search_end();
        self.held_result.lock().unwrap().take();

        if let (Some(fen), Some(m)) = (self.ponder_fen.take(), self.ponder_move.take()) {
            let mut st = self.state.lock().unwrap();
            match Board::from_fen(&fen) {
                Ok(mut board) => {
                    board.make_move(m, false);
                    st.board = board;
                }
                Err(e) => eprintln!("info string ponder restore failed: {e}"),
            }
        }

        let limits = match self.saved_think_ms.take() {
            Some(ms) => SearchLimits::movetime(ms),
            None => SearchLimits::infinite(),
        };
        self.start_search(limits, false);
    }

    fn handle_display(&self) {
        let st = self.state.lock().unwrap();
        println!("{}", st.board);
        println!("FEN: {}", st.board.to_fen());
        println!("Key: {:016X}", st.board.zobrist());
        let _ = io::stdout().flush();
    }

    // ========================================================================
    // SEARCH LIFECYCLE
    // ========================================================================

    fn start_search(&mut self, limits: SearchLimits, ponder: bool) {
        self.stop.store(false, Ordering::SeqCst);
        self.abort_reason.store(ABORT_NONE, Ordering::SeqCst);
        if !ponder {
            self.held_result.lock().unwrap().take();
        }

        // Arm the time-out as a one-shot timer keyed to this search's
        // generation; timers from superseded searches fizzle harmlessly.
        let id = self.search_id.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(ms) = limits.time.allocated_ms() {
            let stop = Arc::clone(&self.stop);
            let search_id = Arc::clone(&self.search_id);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(ms.saturating_add(1)));
                if search_id.load(Ordering::SeqCst) == id {
                    stop.store(true, Ordering::SeqCst);
                }
            });
        }

        {
            let (lock, _) = &*self.searching;
            *lock.lock().unwrap() = true;
        }
        let job = SearchJob {
            limits,
            ponder,
            announce_ponder: self.ponder_enabled,
        };
        if self.job_tx.send(job).is_err() {
            let (lock, _) = &*self.searching;
            *lock.lock().unwrap() = false;
        }
    }

    fn cancel_and_wait(&self) {
        self.stop.store(true, Ordering::SeqCst);
        self.wait_for_search_end();
    }

    fn wait_for_search_end(&self) {
        let (lock, cvar) = &*self.searching;
        let mut searching = lock.lock().unwrap();
        while *searching {
            searching = cvar.wait(searching).unwrap();
        }
    }

    #[cfg(test)]
    fn board_fen(&self) -> String {
        self.state.lock().unwrap().board.to_fen()
    }
}

impl Default for UciEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// WORKER
// ============================================================================

fn worker_loop(
    job_rx: mpsc::Receiver<SearchJob>,
    state: Arc<Mutex<EngineState>>,
    stop: Arc<AtomicBool>,
    abort_reason: Arc<AtomicU8>,
    searching: Arc<(Mutex<bool>, Condvar)>,
    held_result: Arc<Mutex<Option<SearchResult>>>,
) {
    for job in job_rx {
        let result = {
            let mut guard = state.lock().unwrap();
            let st = &mut *guard;
            st.searcher
                .search(&mut st.board, &mut st.tt, &job.limits, &stop, print_info)
        };

        match result {
            Some(result) => {
                if job.ponder {
                    match abort_reason.load(Ordering::SeqCst) {
                        // Host abandoned the ponder: answer it.
                        ABORT_STOP => send_bestmove(&result, job.announce_ponder),
                        // Converted by ponderhit: the follow-up search answers.
                        ABORT_PONDERHIT => {}
                        // Finished on its own: hold until stop or ponderhit.
                        _ => *held_result.lock().unwrap() = Some(result),
                    }
                } else {
                    send_bestmove(&result, job.announce_ponder);
                }
            }
            None => send("bestmove 0000"),
        }

        let (lock, cvar) = &*searching;
        *lock.lock().unwrap() = false;
        cvar.notify_all();
    }
}

fn print_info(info: &SearchInfo) {
    let score = if is_mate_score(info.score) {
        format!("mate {}", mate_in_moves(info.score))
    } else {
        format!("cp {}", info.score)
    };
    let pv: Vec<String> = info.pv.iter().map(|m| move_to_uci(*m)).collect();

    let mut line = format!(
        "info depth {} seldepth {} time {} nodes {} nps {} score {} hashfull {}",
        info.depth, info.seldepth, info.time_ms, info.nodes, info.nps, score, info.hashfull
    );
    if !pv.is_empty() {
        line.push_str(" pv ");
        line.push_str(&pv.join(" "));
    }
    send(&line);
}

fn send_bestmove(result: &SearchResult, announce_ponder: bool) {
    match (announce_ponder, result.ponder) {
        (true, Some(ponder)) => send(&format!(
            "bestmove {} ponder {}",
            move_to_uci(result.best_move),
            move_to_uci(ponder)
        )),
        _ => send(&format!("bestmove {}", move_to_uci(result.best_move))),
    }
}

fn send(msg: &str) {
    println!("{msg}");
    let _ = io::stdout().flush();
}

// ============================================================================
// MOVE FORMATTING
// ============================================================================

pub fn move_to_uci(m: Move) -> String {
    let mut s = format!("{}{}", square_name(m.from()), square_name(m.to()));
    if m.is_promotion() {
        s.push(match m.flag() {
            MoveFlag::PromoteQueen => 'q',
            MoveFlag::PromoteRook => 'r',
            MoveFlag::PromoteBishop => 'b',
            MoveFlag::PromoteKnight => 'n',
            _ => unreachable!(),
        });
    }
    s
}

fn parse_square(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    if bytes.len() != 2 {
        return None;
    }
    let file = (bytes[0] as char).to_digit(18)?.checked_sub(10)?;
    let rank = (bytes[1] as char).to_digit(10)?.checked_sub(1)?;
    if rank > 7 {
        return None;
    }
    Some((rank * 8 + file) as usize)
}

/// Decode a UCI move string against the legal moves of `board`.
pub fn decode_move(board: &Board, move_str: &str) -> Option<Move> {
    if move_str.len() < 4 || !move_str.is_ascii() {
        return None;
    }
    let from = parse_square(&move_str[0..2])?;
    let to = parse_square(&move_str[2..4])?;
    let promo = move_str.chars().nth(4);

    let mut collector = MoveCollector::new();
    movegen::generate_moves(board, &mut collector, false);

    collector.as_slice().iter().copied().find(|m| {
        m.from() == from
            && m.to() == to
            && match promo {
                Some(c) => {
                    m.is_promotion()
                        && match m.flag() {
                            MoveFlag::PromoteQueen => c == 'q',
                            MoveFlag::PromoteRook => c == 'r',
                            MoveFlag::PromoteBishop => c == 'b',
                            MoveFlag::PromoteKnight => c == 'n',
                            _ => false,
                        }
                }
                None => !m.is_promotion(),
            }
    })
}
