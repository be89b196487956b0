use crate::api::ApiClient;
use crate::error::ApiError;
use crate::models::{Application, ApplicationStatus, RecordId};
use crate::optimistic;

/// Kanban view of the fetched applications: one column per status, with a
/// cursor over (column, row).
#[derive(Debug, Clone, Default)]
pub struct Board {
    apps: Vec<Application>,
    column: usize,
    row: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    Moved,
    Unchanged,
}

impl Board {
    pub fn new(apps: Vec<Application>) -> Self {
        Self {
            apps,
            column: 0,
            row: 0,
        }
    }

    pub fn applications(&self) -> &[Application] {
        &self.apps
    }

    /// Swaps in a fresh list from the server, keeping the cursor in range.
    pub fn replace(&mut self, apps: Vec<Application>) {
        self.apps = apps;
        self.clamp_row();
    }

    pub fn column_cards(&self, status: ApplicationStatus) -> Vec<&Application> {
        self.apps.iter().filter(|a| a.status == status).collect()
    }

    /// Cards whose status is not one of the board columns.
    pub fn unplaced(&self) -> usize {
        self.apps.iter().filter(|a| !a.status.is_known()).count()
    }

    pub fn status_of(&self, id: &RecordId) -> Option<ApplicationStatus> {
        self.apps.iter().find(|a| &a.id == id).map(|a| a.status)
    }

    /// Returns false when no card has `id`.
    pub fn set_status(&mut self, id: &RecordId, status: ApplicationStatus) -> bool {
        match self.apps.iter_mut().find(|a| &a.id == id) {
            Some(app) => {
                app.status = status;
                self.clamp_row();
                true
            }
            None => false,
        }
    }

    // --- Cursor ---

    pub fn selected_column(&self) -> ApplicationStatus {
        ApplicationStatus::ALL[self.column]
    }

    pub fn selected_row(&self) -> usize {
        self.row
    }

    pub fn selected(&self) -> Option<&Application> {
        self.column_cards(self.selected_column()).get(self.row).copied()
    }

    pub fn left(&mut self) {
        if self.column > 0 {
            self.column -= 1;
            self.clamp_row();
        }
    }

    pub fn right(&mut self) {
        if self.column + 1 < ApplicationStatus::ALL.len() {
            self.column += 1;
            self.clamp_row();
        }
    }

    pub fn up(&mut self) {
        self.row = self.row.saturating_sub(1);
    }

    pub fn down(&mut self) {
        let len = self.column_cards(self.selected_column()).len();
        if self.row + 1 < len {
            self.row += 1;
        }
    }

    fn clamp_row(&mut self) {
        let len = self.column_cards(self.selected_column()).len();
        self.row = self.row.min(len.saturating_sub(1));
    }
}

/// Moves a card to `target` optimistically and persists it through `client`.
/// On failure the board is reloaded from the server.
pub fn move_card(
    board: &mut Board,
    client: &ApiClient,
    id: &RecordId,
    target: ApplicationStatus,
) -> Result<MoveOutcome, ApiError> {
    move_card_with(
        board,
        id,
        target,
        |_| client.patch_status(id, target),
        || client.list_applications(),
    )
}

/// Same as [`move_card`] with the persistence and reload steps supplied by
/// the caller. `persist` receives the board with the move already applied.
/// If `reload` fails too, the board goes back to how it was before the move.
pub fn move_card_with(
    board: &mut Board,
    id: &RecordId,
    target: ApplicationStatus,
    persist: impl FnOnce(&Board) -> Result<(), ApiError>,
    reload: impl FnOnce() -> Result<Vec<Application>, ApiError>,
) -> Result<MoveOutcome, ApiError> {
    if !target.is_known() {
        return Err(ApiError::Validation(format!("'{}' is not a board column", target)));
    }
    let Some(current) = board.status_of(id) else {
        return Err(ApiError::Validation(format!("Application {} is not on the board", id)));
    };
    if current == target {
        return Ok(MoveOutcome::Unchanged);
    }

    let snapshot = board.apps.clone();
    tracing::debug!(%id, from = %current, to = %target, "moving card");

    optimistic::apply(
        board,
        |b| {
            b.set_status(id, target);
        },
        persist,
        |b| match reload() {
            Ok(apps) => b.replace(apps),
            Err(err) => {
                tracing::warn!(error = %err, "reload after failed move also failed, restoring snapshot");
                b.replace(snapshot);
            }
        },
    )
    .map(|()| MoveOutcome::Moved)
    .inspect_err(|err| tracing::warn!(%id, error = %err, "status move rolled back"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::{client_with, FakeTransport};
    use crate::api::Method;

    fn app(id: &str, status: &str) -> Application {
        serde_json::from_value(serde_json::json!({ "id": id, "status": status, "title": format!("Job {}", id) }))
            .unwrap()
    }

    fn sample_board() -> Board {
        Board::new(vec![
            app("1", "applied"),
            app("2", "applied"),
            app("3", "interviewing"),
            app("4", "withdrawn"),
        ])
    }

    #[test]
    fn test_columns_and_unplaced() {
        let board = sample_board();
        assert_eq!(board.column_cards(ApplicationStatus::Applied).len(), 2);
        assert_eq!(board.column_cards(ApplicationStatus::Saved).len(), 0);
        assert_eq!(board.unplaced(), 1);
    }

    #[test]
    fn test_cursor_navigation() {
        let mut board = sample_board();
        assert!(board.selected().is_none());

        board.right();
        assert_eq!(board.selected_column(), ApplicationStatus::Applied);
        assert_eq!(board.selected().unwrap().id.as_str(), "1");

        board.down();
        assert_eq!(board.selected().unwrap().id.as_str(), "2");
        board.down();
        assert_eq!(board.selected_row(), 1);

        board.right();
        board.right();
        assert_eq!(board.selected_column(), ApplicationStatus::Interviewing);
        assert_eq!(board.selected_row(), 0);

        for _ in 0..10 {
            board.right();
        }
        assert_eq!(board.selected_column(), ApplicationStatus::Rejected);
    }

    #[test]
    fn test_successful_move_keeps_optimistic_state() {
        let transport = FakeTransport::default();
        transport.respond(200, r#"{"id": 1, "status": "interviewing"}"#);
        let client = client_with(&transport, Some("tok"), None);
        let mut board = sample_board();

        let outcome = move_card(&mut board, &client, &RecordId::from("1"), ApplicationStatus::Interviewing).unwrap();
        assert_eq!(outcome, MoveOutcome::Moved);
        assert_eq!(board.status_of(&RecordId::from("1")), Some(ApplicationStatus::Interviewing));

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].method, Method::Patch);
        assert_eq!(sent[0].path, "applications/1/");
    }

    #[test]
    fn test_move_visible_before_persist_resolves() {
        let mut board = sample_board();
        let mut observed = None;

        let _ = move_card_with(
            &mut board,
            &RecordId::from("2"),
            ApplicationStatus::Offer,
            |b| {
                observed = b.status_of(&RecordId::from("2"));
                Ok(())
            },
            || panic!("reload must not run after a successful persist"),
        );
        assert_eq!(observed, Some(ApplicationStatus::Offer));
    }

    #[test]
    fn test_failed_move_reloads_server_truth() {
        let transport = FakeTransport::default();
        transport
            .respond(500, "Internal Server Error")
            .respond(200, r#"[{"id": "1", "status": "applied"}, {"id": "2", "status": "saved"}]"#);
        let client = client_with(&transport, Some("tok"), None);
        let mut board = sample_board();

        let err = move_card(&mut board, &client, &RecordId::from("1"), ApplicationStatus::Offer).unwrap_err();
        assert!(matches!(err, ApiError::Server { status: 500, .. }));

        assert_eq!(board.status_of(&RecordId::from("1")), Some(ApplicationStatus::Applied));
        assert_eq!(board.status_of(&RecordId::from("2")), Some(ApplicationStatus::Saved));
        assert_eq!(board.applications().len(), 2);

        let sent = transport.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].method, Method::Get);
        assert_eq!(sent[1].path, "applications/");
    }

    #[test]
    fn test_failed_move_and_failed_reload_restores_snapshot() {
        let transport = FakeTransport::default();
        transport.fail_network().fail_network();
        let client = client_with(&transport, Some("tok"), None);
        let mut board = sample_board();

        let err = move_card(&mut board, &client, &RecordId::from("3"), ApplicationStatus::Rejected).unwrap_err();
        assert!(matches!(err, ApiError::Network(_)));
        assert_eq!(board.status_of(&RecordId::from("3")), Some(ApplicationStatus::Interviewing));
        assert_eq!(board.applications().len(), 4);
    }

    #[test]
    fn test_move_to_same_status_sends_nothing() {
        let transport = FakeTransport::default();
        let client = client_with(&transport, Some("tok"), None);
        let mut board = sample_board();

        let outcome = move_card(&mut board, &client, &RecordId::from("1"), ApplicationStatus::Applied).unwrap();
        assert_eq!(outcome, MoveOutcome::Unchanged);
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn test_move_unknown_card_or_column_is_rejected() {
        let transport = FakeTransport::default();
        let client = client_with(&transport, Some("tok"), None);
        let mut board = sample_board();

        let missing = move_card(&mut board, &client, &RecordId::from("99"), ApplicationStatus::Offer);
        assert!(matches!(missing, Err(ApiError::Validation(_))));

        let bad_column = move_card(&mut board, &client, &RecordId::from("1"), ApplicationStatus::Unknown);
        assert!(matches!(bad_column, Err(ApiError::Validation(_))));

        assert!(transport.sent().is_empty());
    }

    #[test]
    fn test_independent_moves() {
        let transport = FakeTransport::default();
        transport.respond(200, "").respond(200, "");
        let client = client_with(&transport, Some("tok"), None);
        let mut board = sample_board();

        move_card(&mut board, &client, &RecordId::from("1"), ApplicationStatus::PhoneScreen).unwrap();
        move_card(&mut board, &client, &RecordId::from("2"), ApplicationStatus::Rejected).unwrap();

        assert_eq!(board.status_of(&RecordId::from("1")), Some(ApplicationStatus::PhoneScreen));
        assert_eq!(board.status_of(&RecordId::from("2")), Some(ApplicationStatus::Rejected));
        assert_eq!(board.column_cards(ApplicationStatus::Applied).len(), 0);
    }
}
