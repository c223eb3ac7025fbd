use cc_lab_abstract::{ImpairmentAxis, ImpairmentSetting};
use tracing::info;

use crate::error::ImpairmentError;
use crate::netem::{LinkEmulator, LinkShape};

/// Owns the single shared emulated link and its current configuration.
pub struct ImpairmentController<L> {
    link: L,
    active: Option<ImpairmentSetting>,
}

impl<L: LinkEmulator> ImpairmentController<L> {
    pub fn new(link: L) -> Self {
        Self { link, active: None }
    }

    /// Put the link into `value` on `axis`, clearing any other axis.
    ///
    /// Re-applying the active setting does not touch the link. On failure the
    /// link state is unknown, so the next call always reconfigures.
    pub fn apply(&mut self, axis: ImpairmentAxis, value: f64) -> Result<(), ImpairmentError> {
        let setting = ImpairmentSetting::new(axis, value)?;
        if self.active == Some(setting) {
            return Ok(());
        }
        self.active = None;
        self.link.configure(&LinkShape::for_setting(&setting))?;
        info!(%setting, "link impairment applied");
        self.active = Some(setting);
        Ok(())
    }

    pub fn apply_setting(&mut self, setting: &ImpairmentSetting) -> Result<(), ImpairmentError> {
        self.apply(setting.axis, setting.value)
    }

    /// Remove every impairment from the link.
    pub fn clear(&mut self) -> Result<(), ImpairmentError> {
        self.active = None;
        self.link.configure(&LinkShape::default())?;
        info!("link impairment cleared");
        Ok(())
    }

    pub fn active(&self) -> Option<ImpairmentSetting> {
        self.active
    }

    pub fn link(&self) -> &L {
        &self.link
    }
}
