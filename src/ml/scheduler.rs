// ============================================================
// Layer 5 — ReduceLROnPlateau
// ============================================================
// Lowers the learning rate when a monitored metric stops
// improving. The trainer feeds it the validation Dice in `Max`
// mode; after more than `patience` evaluations without a
// relative improvement of `threshold`, lr ← max(lr · factor,
// min_lr). Changes smaller than `eps` are ignored.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlateauMode {
    Min,
    Max,
}

#[derive(Debug, Clone)]
pub struct ReduceLrOnPlateau {
    mode:             PlateauMode,
    factor:           f64,
    patience:         usize,
    threshold:        f64,
    cooldown:         usize,
    min_lr:           f64,
    eps:              f64,
    lr:               f64,
    best:             f64,
    num_bad_epochs:   usize,
    cooldown_counter: usize,
}

impl ReduceLrOnPlateau {
    pub fn new(lr: f64, mode: PlateauMode) -> Self {
        Self {
            mode,
            factor: 0.1,
            patience: 10,
            threshold: 1e-4,
            cooldown: 0,
            min_lr: 0.0,
            eps: 1e-8,
            lr,
            best: match mode {
                PlateauMode::Min => f64::INFINITY,
                PlateauMode::Max => f64::NEG_INFINITY,
            },
            num_bad_epochs: 0,
            cooldown_counter: 0,
        }
    }

    pub fn with_patience(mut self, patience: usize) -> Self {
        self.patience = patience;
        self
    }

    pub fn with_cooldown(mut self, cooldown: usize) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_min_lr(mut self, min_lr: f64) -> Self {
        self.min_lr = min_lr;
        self
    }

    pub fn lr(&self) -> f64 {
        self.lr
    }

    pub fn best(&self) -> f64 {
        self.best
    }

    /// Record one evaluation of the metric; returns the learning rate to use next.
    pub fn step(&mut self, metric: f64) -> f64 {
        if self.is_better(metric) {
            self.best = metric;
            self.num_bad_epochs = 0;
        } else {
            self.num_bad_epochs += 1;
        }

        if self.cooldown_counter > 0 {
            self.cooldown_counter -= 1;
            self.num_bad_epochs = 0;
        }

        if self.num_bad_epochs > self.patience {
            self.reduce();
            self.cooldown_counter = self.cooldown;
            self.num_bad_epochs = 0;
        }

        self.lr
    }

    fn is_better(&self, metric: f64) -> bool {
        match self.mode {
            PlateauMode::Min => metric < self.best * (1.0 - self.threshold),
            PlateauMode::Max => metric > self.best * (1.0 + self.threshold),
        }
    }

    fn reduce(&mut self) {
        let new_lr = (self.lr * self.factor).max(self.min_lr);
        if self.lr - new_lr > self.eps {
            tracing::info!("Reducing learning rate {:.3e} -> {:.3e}", self.lr, new_lr);
            self.lr = new_lr;
        }
    }
}
