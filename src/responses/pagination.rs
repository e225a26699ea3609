//! Page cursor and accumulated responses for one comment.
//!
//! Pure state: no I/O, no channels. The view-model asks for a `FetchTicket`
//! before calling the interactor and hands the result back through
//! `finish_fetch`. Every restart (initial load, refresh) bumps the generation,
//! so a fetch started before the restart is recognised as stale and dropped.

use crate::domain::{Comment, ResponsesPage};
use crate::interactor::InteractorError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageCursor {
    /// Next page to request, 1-based.
    At(u32),
    /// Server reported no further pages.
    End,
}

impl PageCursor {
    pub fn is_end(&self) -> bool {
        matches!(self, PageCursor::End)
    }
}

/// Permission to run exactly one fetch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FetchTicket {
    pub generation: u64,
    pub page: u32,
}

#[derive(Debug, PartialEq, Eq)]
pub enum FetchOutcome {
    Applied { can_load_more: bool },
    Failed(InteractorError),
    /// A restart happened while this fetch was in flight.
    Stale,
}

#[derive(Clone, Debug)]
pub struct ResponsesState {
    pub comment: Comment,
    pub responses: Vec<Comment>,
    pub cursor: PageCursor,
    pub busy: bool,
    pub refreshing: bool,
    generation: u64,
}

impl ResponsesState {
    pub fn new(comment: Comment) -> Self {
        Self {
            comment,
            responses: Vec::new(),
            cursor: PageCursor::At(1),
            busy: false,
            refreshing: false,
            generation: 0,
        }
    }

    pub fn begin_initial(&mut self) -> FetchTicket {
        self.restart(false)
    }

    pub fn begin_refresh(&mut self) -> FetchTicket {
        self.restart(true)
    }

    fn restart(&mut self, refreshing: bool) -> FetchTicket {
        self.generation += 1;
        self.cursor = PageCursor::At(1);
        self.responses.clear();
        self.busy = true;
        self.refreshing = refreshing;
        FetchTicket { generation: self.generation, page: 1 }
    }

    /// `None` while a fetch is in flight or once every page is loaded.
    pub fn begin_load_more(&mut self) -> Option<FetchTicket> {
        if self.busy {
            return None;
        }
        match self.cursor {
            PageCursor::End => None,
            PageCursor::At(page) => {
                self.busy = true;
                Some(FetchTicket { generation: self.generation, page })
            }
        }
    }

    pub fn finish_fetch(&mut self, ticket: FetchTicket, result: Result<ResponsesPage, InteractorError>) -> FetchOutcome {
        if ticket.generation != self.generation {
            return FetchOutcome::Stale;
        }
        self.busy = false;
        self.refreshing = false;
        match result {
            Ok(page) => {
                let more = page.has_next();
                self.responses.extend(page.results);
                self.cursor = if more { PageCursor::At(ticket.page + 1) } else { PageCursor::End };
                FetchOutcome::Applied { can_load_more: more }
            }
            Err(e) => FetchOutcome::Failed(e),
        }
    }

    #[cfg(test)]
    pub fn can_load_more(&self) -> bool {
        !self.cursor.is_end()
    }
}
