//! Applet trait and the registry of installed applets.

use log::debug;

use crate::buffer::ByteBuffer;
use crate::card::Context;
use crate::errors::{CmdResult, Error};

/// An application installed on the card, addressed by its AID.
pub trait Applet {
    /// The AID prefix this applet answers to.
    fn aid(&self) -> &'static [u8];

    /// Called when the applet gets selected. Resets the per-session state
    /// and may write an FCI into `out`.
    fn select(&mut self, ctx: &mut Context, out: &mut ByteBuffer) -> Result<(), Error>;

    /// Called when another applet gets selected, so sensitive session state
    /// can be dropped.
    fn deselect(&mut self);

    /// Handle one full APDU while selected.
    fn apdu_exchange(&mut self, ctx: &mut Context, apdu: &[u8], out: &mut ByteBuffer) -> CmdResult;
}

/// The fixed set of installed applets plus the current selection.
pub struct AppletStorage {
    applets: Vec<Box<dyn Applet>>,
    selected: Option<usize>,
}

impl AppletStorage {
    pub fn new() -> Self {
        Self {
            applets: Vec::new(),
            selected: None,
        }
    }

    /// Install an applet.
    pub fn register(&mut self, applet: Box<dyn Applet>) {
        self.applets.push(applet);
    }

    /// Select the applet whose AID is a prefix of `aid`.
    ///
    /// On failure the previous selection stays in place.
    pub fn select_applet(
        &mut self,
        ctx: &mut Context,
        aid: &[u8],
        out: &mut ByteBuffer,
    ) -> Result<(), Error> {
        let index = self
            .applets
            .iter()
            .position(|a| aid.starts_with(a.aid()))
            .ok_or(Error::AppletNotFound)?;

        if let Some(previous) = self.selected {
            if previous != index {
                self.applets[previous].deselect();
            }
        }

        debug!("selecting applet {}", index);
        self.applets[index].select(ctx, out)?;
        self.selected = Some(index);
        Ok(())
    }

    /// The currently selected applet, if any.
    pub fn selected_applet(&mut self) -> Option<&mut dyn Applet> {
        let index = self.selected?;
        Some(self.applets[index].as_mut())
    }

    /// Drop the selection and its session state (power cycle).
    pub fn reset(&mut self) {
        if let Some(index) = self.selected.take() {
            self.applets[index].deselect();
        }
    }
}

impl Default for AppletStorage {
    fn default() -> Self {
        Self::new()
    }
}
