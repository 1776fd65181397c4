//! Per-frame driver.
//!
//! [`Executor::run`] is called once per display refresh. Each registered
//! [`PipelineGroup`] records its passes and is submitted on its own, in
//! registration order.

use crate::errors::Result;
use crate::label::Label;
use crate::pipeline_group::PipelineGroup;

#[derive(Debug, Default)]
pub struct ExecutorOptions {
    pub label: Option<String>,
    /// Fit each canvas to its client size before rendering. Defaults to `true`.
    pub auto_resize_canvas: Option<bool>,
}

#[derive(Debug)]
pub struct Executor {
    label: Label,
    pipeline_groups: Vec<PipelineGroup>,
    auto_resize_canvas: bool,
    frame: u64,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(ExecutorOptions::default())
    }
}

impl Executor {
    #[must_use]
    pub fn new(options: ExecutorOptions) -> Self {
        Self {
            label: options.label.into(),
            pipeline_groups: Vec::new(),
            auto_resize_canvas: options.auto_resize_canvas.unwrap_or(true),
            frame: 0,
        }
    }

    #[inline]
    #[must_use]
    pub fn label(&self) -> &Label {
        &self.label
    }

    #[inline]
    #[must_use]
    pub fn auto_resize_canvas(&self) -> bool {
        self.auto_resize_canvas
    }

    pub fn set_auto_resize_canvas(&mut self, enabled: bool) {
        self.auto_resize_canvas = enabled;
    }

    /// Number of completed [`run`](Self::run) calls.
    #[inline]
    #[must_use]
    pub fn frame(&self) -> u64 {
        self.frame
    }

    #[must_use]
    pub fn pipeline_groups(&self) -> &[PipelineGroup] {
        &self.pipeline_groups
    }

    pub fn pipeline_group_mut(&mut self, index: usize) -> Option<&mut PipelineGroup> {
        self.pipeline_groups.get_mut(index)
    }

    /// Builds every group that is not built yet, then registers them all.
    /// If any build fails, nothing is registered and every group passed in
    /// is released.
    pub fn add_pipeline_groups(
        &mut self,
        groups: impl IntoIterator<Item = PipelineGroup>,
    ) -> Result<()> {
        let mut groups: Vec<PipelineGroup> = groups.into_iter().collect();
        let built = groups
            .iter_mut()
            .filter(|group| !group.is_built())
            .try_for_each(PipelineGroup::build);
        if let Err(err) = built {
            log::warn!("Pipeline group build failed, releasing {} groups: {err}", groups.len());
            groups.iter_mut().for_each(PipelineGroup::release);
            return Err(err);
        }
        self.pipeline_groups.extend(groups);
        Ok(())
    }

    /// Records and submits one frame for every group.
    pub fn run(&mut self) -> Result<()> {
        for group in &mut self.pipeline_groups {
            let commands = group.record_frame(self.frame, self.auto_resize_canvas)?;
            if commands.is_empty() {
                continue;
            }
            let device = group.context().get_device()?;
            device.submit(&commands)?;
        }
        self.frame += 1;
        Ok(())
    }
}
