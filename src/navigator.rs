//! The grid navigation state machine.
//!
//! [`Navigator`] owns the [`Selection`] and reacts to [`Command`]s by
//! transforming it and driving a [`Presenter`].  Every state change moves
//! the pointer to the centre of the new selection and redraws the whole
//! overlay; there is no incremental redraw.

use crate::command::{Button, Command, Direction};
use crate::config::{Config, GridConfig};
use crate::selection::Selection;
use crate::traits::Presenter;
use log::{debug, info};

/// Whether the event loop should keep running after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Narrows a selection rectangle down to a pointer target.
///
/// The presenter is passed per call rather than owned.
#[derive(Debug, Clone)]
pub struct Navigator {
    selection: Selection,
    history: Vec<Selection>,
    grid: GridConfig,
    cut_fraction: f64,
    move_fraction: f64,
}

impl Default for Navigator {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl Navigator {
    pub fn new(grid: GridConfig, cut_fraction: f64, move_fraction: f64) -> Self {
        Self {
            selection: Selection::FULL,
            history: Vec::new(),
            grid,
            cut_fraction,
            move_fraction,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.grid, config.cut_fraction, config.move_fraction)
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    pub fn grid(&self) -> &GridConfig {
        &self.grid
    }

    /// Number of states [`undo`](Self::undo) can still go back through.
    pub fn depth(&self) -> usize {
        self.history.len()
    }

    /// Process a single [`Command`].
    pub fn apply<P: Presenter>(&mut self, cmd: Command, presenter: &mut P) -> Result<Flow, P::Error> {
        match cmd {
            Command::Cut(dir) => self.cut(dir, presenter).map(|()| Flow::Continue),
            Command::Move(dir) => self.move_by(dir, presenter).map(|()| Flow::Continue),
            Command::Undo => self.undo(presenter).map(|()| Flow::Continue),
            Command::Click(button) => Ok(self.commit(button, presenter)),
            Command::Press(button) => Ok(self.press(button, presenter)),
            Command::Release(button) => Ok(self.release(button, presenter)),
            Command::Scroll(dir) => Ok(self.scroll(dir, presenter)),
            Command::Quit => Ok(self.cancel()),
        }
    }

    /// Run `commands` in order, stopping at the first one that exits.
    pub fn apply_all<P: Presenter>(
        &mut self,
        commands: &[Command],
        presenter: &mut P,
    ) -> Result<Flow, P::Error> {
        for &cmd in commands {
            if self.apply(cmd, presenter)? == Flow::Exit {
                return Ok(Flow::Exit);
            }
        }
        Ok(Flow::Continue)
    }

    /// Redraw and re-aim without changing state.
    ///
    /// Used for the first frame once the surface size is known.
    pub fn refresh<P: Presenter>(&self, presenter: &mut P) -> Result<(), P::Error> {
        self.aim(presenter);
        presenter.render(&self.selection, &self.grid)
    }

    /// Keep the configured fraction of the selection towards `dir`.
    pub fn cut<P: Presenter>(&mut self, dir: Direction, presenter: &mut P) -> Result<(), P::Error> {
        let next = self.selection.cut(dir, self.cut_fraction);
        debug!("cut {}: {:?} -> {:?}", dir, self.selection, next);
        self.push(next);
        self.refresh(presenter)
    }

    /// Pan the selection towards `dir`.  Stops at the output edge.
    pub fn move_by<P: Presenter>(&mut self, dir: Direction, presenter: &mut P) -> Result<(), P::Error> {
        let next = self.selection.shift(dir, self.move_fraction);
        debug!("move {}: {:?} -> {:?}", dir, self.selection, next);
        self.push(next);
        self.refresh(presenter)
    }

    /// Go back to the selection before the last cut or move.
    ///
    /// With nothing to undo the overlay is still redrawn.
    pub fn undo<P: Presenter>(&mut self, presenter: &mut P) -> Result<(), P::Error> {
        match self.history.pop() {
            Some(previous) => {
                debug!("undo: {:?} -> {:?}", self.selection, previous);
                self.selection = previous;
            }
            None => debug!("undo: nothing to undo"),
        }
        self.refresh(presenter)
    }

    /// Aim at the centre of the selection and click `button`.
    pub fn commit<P: Presenter>(&mut self, button: Button, presenter: &mut P) -> Flow {
        let (x, y) = self.aim(presenter);
        info!("{} click at ({}, {})", button, x, y);
        presenter.click(button);
        Flow::Exit
    }

    /// Aim and hold `button` down. Navigation goes on, so a drag ends
    /// with [`release`](Self::release) somewhere else.
    pub fn press<P: Presenter>(&mut self, button: Button, presenter: &mut P) -> Flow {
        let (x, y) = self.aim(presenter);
        debug!("{} press at ({}, {})", button, x, y);
        presenter.press(button);
        Flow::Continue
    }

    pub fn release<P: Presenter>(&mut self, button: Button, presenter: &mut P) -> Flow {
        let (x, y) = self.aim(presenter);
        debug!("{} release at ({}, {})", button, x, y);
        presenter.release(button);
        Flow::Continue
    }

    pub fn scroll<P: Presenter>(&mut self, dir: Direction, presenter: &mut P) -> Flow {
        let (x, y) = self.aim(presenter);
        debug!("scroll {} at ({}, {})", dir, x, y);
        presenter.scroll(dir);
        Flow::Continue
    }

    /// Leave without touching the pointer.
    pub fn cancel(&mut self) -> Flow {
        info!("cancelled");
        Flow::Exit
    }

    fn push(&mut self, next: Selection) {
        self.history.push(self.selection);
        self.selection = next;
    }

    fn aim<P: Presenter>(&self, presenter: &mut P) -> (u32, u32) {
        let extent = presenter.output_extent();
        let (x, y) = self.selection.center_in(extent);
        presenter.move_pointer(x, y, extent);
        (x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Color;
    use crate::selection::Extent;

    /// Everything a presenter can be asked to do.
    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Render(Selection),
        Pointer(u32, u32, Extent),
        Click(Button),
        Press(Button),
        Release(Button),
        Scroll(Direction),
    }

    /// Record-keeping mock presenter.
    #[derive(Debug)]
    struct RecordingPresenter {
        extent: Extent,
        calls: Vec<Call>,
        fail_render: bool,
    }

    impl RecordingPresenter {
        fn new(width: u32, height: u32) -> Self {
            Self {
                extent: Extent::new(width, height),
                calls: Vec::new(),
                fail_render: false,
            }
        }

        fn renders(&self) -> Vec<Selection> {
            self.calls
                .iter()
                .filter_map(|c| match c {
                    Call::Render(s) => Some(*s),
                    _ => None,
                })
                .collect()
        }
    }

    #[derive(Debug, thiserror::Error)]
    #[error("recorder error")]
    struct RecorderErr;

    impl Presenter for RecordingPresenter {
        type Error = RecorderErr;

        fn output_extent(&self) -> Extent {
            self.extent
        }

        fn render(&mut self, selection: &Selection, _grid: &GridConfig) -> Result<(), RecorderErr> {
            if self.fail_render {
                return Err(RecorderErr);
            }
            self.calls.push(Call::Render(*selection));
            Ok(())
        }

        fn move_pointer(&mut self, x: u32, y: u32, extent: Extent) {
            self.calls.push(Call::Pointer(x, y, extent));
        }

        fn press(&mut self, button: Button) {
            self.calls.push(Call::Press(button));
        }

        fn release(&mut self, button: Button) {
            self.calls.push(Call::Release(button));
        }

        fn scroll(&mut self, direction: Direction) {
            self.calls.push(Call::Scroll(direction));
        }

        fn click(&mut self, button: Button) {
            self.calls.push(Call::Click(button));
        }
    }

    /// A presenter that only implements the required methods.
    #[derive(Debug, Default)]
    struct PlainPresenter {
        buttons: Vec<(Button, bool)>,
    }

    impl Presenter for PlainPresenter {
        type Error = RecorderErr;

        fn output_extent(&self) -> Extent {
            Extent::new(10, 10)
        }

        fn render(&mut self, _: &Selection, _: &GridConfig) -> Result<(), RecorderErr> {
            Ok(())
        }

        fn move_pointer(&mut self, _: u32, _: u32, _: Extent) {}

        fn press(&mut self, button: Button) {
            self.buttons.push((button, true));
        }

        fn release(&mut self, button: Button) {
            self.buttons.push((button, false));
        }

        fn scroll(&mut self, _: Direction) {}
    }

    fn nav() -> Navigator {
        Navigator::new(GridConfig::default(), 0.5, 0.5)
    }

    #[test]
    fn starts_with_full_selection() {
        let n = nav();
        assert_eq!(n.selection(), Selection::FULL);
        assert_eq!(n.depth(), 0);
    }

    #[test]
    fn refresh_aims_then_renders() {
        let n = nav();
        let mut p = RecordingPresenter::new(1920, 1080);
        n.refresh(&mut p).unwrap();
        let extent = Extent::new(1920, 1080);
        assert_eq!(
            p.calls,
            vec![Call::Pointer(960, 540, extent), Call::Render(Selection::FULL)]
        );
    }

    #[test]
    fn every_mutation_redraws() {
        let mut n = nav();
        let mut p = RecordingPresenter::new(100, 100);
        for cmd in [
            Command::Cut(Direction::Left),
            Command::Move(Direction::Right),
            Command::Undo,
            Command::Undo,
            Command::Undo,
        ] {
            assert_eq!(n.apply(cmd, &mut p).unwrap(), Flow::Continue);
        }
        assert_eq!(p.renders().len(), 5);
        assert_eq!(
            p.calls
                .iter()
                .filter(|c| matches!(c, Call::Pointer(..)))
                .count(),
            5
        );
    }

    #[test]
    fn cut_right_then_down_targets_bottom_right_quadrant() {
        let mut n = nav();
        let mut p = RecordingPresenter::new(1920, 1080);
        n.apply(Command::Cut(Direction::Right), &mut p).unwrap();
        n.apply(Command::Cut(Direction::Down), &mut p).unwrap();
        assert_eq!(n.selection(), Selection::new(0.5, 0.5, 0.5, 0.5));
        assert_eq!(
            p.calls.last(),
            Some(&Call::Render(Selection::new(0.5, 0.5, 0.5, 0.5)))
        );
    }

    #[test]
    fn commit_moves_then_clicks_once() {
        let mut n = nav();
        let mut p = RecordingPresenter::new(1920, 1080);
        n.apply(Command::Cut(Direction::Right), &mut p).unwrap();
        n.apply(Command::Cut(Direction::Down), &mut p).unwrap();
        p.calls.clear();

        let flow = n.apply(Command::Click(Button::Left), &mut p).unwrap();
        assert_eq!(flow, Flow::Exit);
        assert_eq!(
            p.calls,
            vec![
                Call::Pointer(1440, 810, Extent::new(1920, 1080)),
                Call::Click(Button::Left),
            ]
        );
    }

    #[test]
    fn right_click_uses_right_button() {
        let mut n = nav();
        let mut p = RecordingPresenter::new(800, 600);
        n.apply(Command::Click(Button::Right), &mut p).unwrap();
        assert_eq!(p.calls.last(), Some(&Call::Click(Button::Right)));
    }

    #[test]
    fn default_click_is_press_then_release() {
        let mut p = PlainPresenter::default();
        p.click(Button::Middle);
        assert_eq!(p.buttons, vec![(Button::Middle, true), (Button::Middle, false)]);
    }

    #[test]
    fn press_and_release_aim_and_keep_running() {
        let mut n = nav();
        let mut p = RecordingPresenter::new(1000, 1000);
        let extent = Extent::new(1000, 1000);
        assert_eq!(
            n.apply(Command::Press(Button::Left), &mut p).unwrap(),
            Flow::Continue
        );
        n.apply(Command::Cut(Direction::Right), &mut p).unwrap();
        assert_eq!(
            n.apply(Command::Release(Button::Left), &mut p).unwrap(),
            Flow::Continue
        );
        assert_eq!(p.calls[0], Call::Pointer(500, 500, extent));
        assert_eq!(p.calls[1], Call::Press(Button::Left));
        assert_eq!(
            &p.calls[p.calls.len() - 2..],
            &[Call::Pointer(750, 500, extent), Call::Release(Button::Left)]
        );
        assert_eq!(n.depth(), 1, "buttons do not touch the history");
    }

    #[test]
    fn scroll_aims_then_scrolls_without_redraw() {
        let mut n = nav();
        let mut p = RecordingPresenter::new(200, 100);
        let flow = n.apply(Command::Scroll(Direction::Down), &mut p).unwrap();
        assert_eq!(flow, Flow::Continue);
        assert_eq!(
            p.calls,
            vec![
                Call::Pointer(100, 50, Extent::new(200, 100)),
                Call::Scroll(Direction::Down),
            ]
        );
    }

    #[test]
    fn apply_all_runs_in_order_and_stops_at_exit() {
        let mut n = nav();
        let mut p = RecordingPresenter::new(100, 100);
        let flow = n
            .apply_all(
                &[
                    Command::Cut(Direction::Left),
                    Command::Release(Button::Left),
                    Command::Quit,
                    Command::Cut(Direction::Up),
                ],
                &mut p,
            )
            .unwrap();
        assert_eq!(flow, Flow::Exit);
        assert_eq!(n.selection(), Selection::new(0.0, 0.0, 0.5, 1.0));
        assert_eq!(p.renders().len(), 1);
        assert_eq!(p.calls.last(), Some(&Call::Release(Button::Left)));
    }

    #[test]
    fn apply_all_continues_without_exit() {
        let mut n = nav();
        let mut p = RecordingPresenter::new(100, 100);
        let cmds = [Command::Cut(Direction::Down), Command::Scroll(Direction::Up)];
        assert_eq!(n.apply_all(&cmds, &mut p).unwrap(), Flow::Continue);
        assert_eq!(n.apply_all(&[], &mut p).unwrap(), Flow::Continue);
    }

    #[test]
    fn apply_all_stops_at_render_failure() {
        let mut n = nav();
        let mut p = RecordingPresenter::new(100, 100);
        p.fail_render = true;
        let cmds = [Command::Cut(Direction::Down), Command::Press(Button::Left)];
        assert!(n.apply_all(&cmds, &mut p).is_err());
        assert!(!p.calls.contains(&Call::Press(Button::Left)));
    }

    #[test]
    fn quit_leaves_pointer_alone() {
        let mut n = nav();
        let mut p = RecordingPresenter::new(800, 600);
        assert_eq!(n.apply(Command::Quit, &mut p).unwrap(), Flow::Exit);
        assert!(p.calls.is_empty());
    }

    #[test]
    fn move_right_pans_by_move_fraction() {
        let mut n = Navigator::new(GridConfig::default(), 0.25, 0.5);
        let mut p = RecordingPresenter::new(1000, 1000);
        n.apply(Command::Cut(Direction::Left), &mut p).unwrap();
        assert_eq!(n.selection(), Selection::new(0.0, 0.0, 0.25, 1.0));
        n.apply(Command::Move(Direction::Right), &mut p).unwrap();
        assert_eq!(n.selection(), Selection::new(0.125, 0.0, 0.25, 1.0));
    }

    #[test]
    fn undo_walks_back_through_history() {
        let mut n = nav();
        let mut p = RecordingPresenter::new(100, 100);
        n.apply(Command::Cut(Direction::Right), &mut p).unwrap();
        let after_first = n.selection();
        n.apply(Command::Cut(Direction::Up), &mut p).unwrap();
        assert_eq!(n.depth(), 2);

        n.apply(Command::Undo, &mut p).unwrap();
        assert_eq!(n.selection(), after_first);
        n.apply(Command::Undo, &mut p).unwrap();
        assert_eq!(n.selection(), Selection::FULL);
        n.apply(Command::Undo, &mut p).unwrap();
        assert_eq!(n.selection(), Selection::FULL);
    }

    #[test]
    fn render_failure_propagates() {
        let mut n = nav();
        let mut p = RecordingPresenter::new(100, 100);
        p.fail_render = true;
        assert!(n.apply(Command::Cut(Direction::Left), &mut p).is_err());
    }

    #[test]
    fn arbitrary_command_sequences_stay_in_unit_square() {
        let script = [
            Command::Cut(Direction::Down),
            Command::Move(Direction::Down),
            Command::Move(Direction::Down),
            Command::Cut(Direction::Right),
            Command::Move(Direction::Right),
            Command::Undo,
            Command::Move(Direction::Right),
            Command::Cut(Direction::Up),
            Command::Move(Direction::Left),
            Command::Move(Direction::Left),
            Command::Move(Direction::Left),
            Command::Move(Direction::Up),
            Command::Undo,
            Command::Move(Direction::Up),
        ];
        let mut n = Navigator::new(GridConfig::default(), 0.3, 0.9);
        let mut p = RecordingPresenter::new(100, 100);
        for cmd in script {
            n.apply(cmd, &mut p).unwrap();
            assert!(n.selection().is_within_unit(1e-9), "{:?} after {}", n.selection(), cmd);
        }
    }

    #[test]
    fn from_config_copies_style() {
        let mut config = Config::default();
        config.grid.size = 4;
        config.grid.inner = Color::from_argb(0x8000_ff00);
        config.cut_fraction = 0.25;
        let n = Navigator::from_config(&config);
        assert_eq!(n.grid().size, 4);
        assert_eq!(n.grid().inner, Color::from_argb(0x8000_ff00));
        let mut p = RecordingPresenter::new(100, 100);
        let mut n = n;
        n.cut(Direction::Left, &mut p).unwrap();
        assert_eq!(n.selection().width, 0.25);
    }
}
