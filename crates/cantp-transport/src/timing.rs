//! ISO 15765-2 network timing parameters
//!
//! Six timers govern a transfer: N_As/N_Ar bound frame transmission,
//! N_Bs bounds the wait for a Flow Control, N_Cr bounds the wait for a
//! Consecutive Frame, and N_Br/N_Cs are the node's own delays before
//! sending an FC or the next CF. The sender-side delays are capped so
//! the peer's paired timeout cannot expire: at most 90 % of the paired
//! timeout minus the last measured paired latency.

use std::fmt;
use std::time::Duration;

use crate::error::TransportError;

/// ISO default for the four timeout parameters.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Performance-requirement fraction of a timeout usable as a delay.
const DELAY_TIMEOUT_FRACTION: f64 = 0.9;

/// Names of the six network timing parameters, for errors and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimingParameter {
    NAs,
    NAr,
    NBs,
    NBr,
    NCs,
    NCr,
}

impl fmt::Display for TimingParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NAs => "N_As",
            Self::NAr => "N_Ar",
            Self::NBs => "N_Bs",
            Self::NBr => "N_Br",
            Self::NCs => "N_Cs",
            Self::NCr => "N_Cr",
        };
        f.write_str(name)
    }
}

/// One node's timing configuration plus the latencies measured on it.
#[derive(Debug, Clone)]
pub struct NetworkTimingParameters {
    n_as_timeout: Duration,
    n_ar_timeout: Duration,
    n_bs_timeout: Duration,
    n_cr_timeout: Duration,
    n_br: Duration,
    /// `None` means "use the separation time requested by the peer".
    n_cs: Option<Duration>,
    measured_n_as: Option<Duration>,
    measured_n_ar: Option<Duration>,
}

impl Default for NetworkTimingParameters {
    fn default() -> Self {
        Self {
            n_as_timeout: DEFAULT_TIMEOUT,
            n_ar_timeout: DEFAULT_TIMEOUT,
            n_bs_timeout: DEFAULT_TIMEOUT,
            n_cr_timeout: DEFAULT_TIMEOUT,
            n_br: Duration::ZERO,
            n_cs: None,
            measured_n_as: None,
            measured_n_ar: None,
        }
    }
}

impl NetworkTimingParameters {
    pub fn n_as_timeout(&self) -> Duration {
        self.n_as_timeout
    }

    pub fn n_ar_timeout(&self) -> Duration {
        self.n_ar_timeout
    }

    pub fn n_bs_timeout(&self) -> Duration {
        self.n_bs_timeout
    }

    pub fn n_cr_timeout(&self) -> Duration {
        self.n_cr_timeout
    }

    pub fn n_br(&self) -> Duration {
        self.n_br
    }

    pub fn n_cs(&self) -> Option<Duration> {
        self.n_cs
    }

    /// Latency of the last transmitted data frame.
    pub fn measured_n_as(&self) -> Option<Duration> {
        self.measured_n_as
    }

    /// Latency of the last transmitted Flow Control frame.
    pub fn measured_n_ar(&self) -> Option<Duration> {
        self.measured_n_ar
    }

    pub fn set_n_as_timeout(&mut self, value: Duration) -> Result<(), TransportError> {
        check_timeout(TimingParameter::NAs, value)?;
        self.n_as_timeout = value;
        Ok(())
    }

    pub fn set_n_ar_timeout(&mut self, value: Duration) -> Result<(), TransportError> {
        check_timeout(TimingParameter::NAr, value)?;
        self.n_ar_timeout = value;
        Ok(())
    }

    pub fn set_n_bs_timeout(&mut self, value: Duration) -> Result<(), TransportError> {
        check_timeout(TimingParameter::NBs, value)?;
        self.n_bs_timeout = value;
        Ok(())
    }

    pub fn set_n_cr_timeout(&mut self, value: Duration) -> Result<(), TransportError> {
        check_timeout(TimingParameter::NCr, value)?;
        self.n_cr_timeout = value;
        Ok(())
    }

    /// The FC delay is bounded by the peer's N_Bs budget.
    pub fn set_n_br(&mut self, value: Duration) -> Result<(), TransportError> {
        let max = self.max_delay(self.n_bs_timeout, self.measured_n_ar);
        if value > max {
            return Err(TransportError::InvalidTimingValue {
                parameter: TimingParameter::NBr,
                reason: format!("{value:?} exceeds the allowed maximum of {max:?}"),
            });
        }
        self.n_br = value;
        Ok(())
    }

    /// The CF gap is bounded by the peer's N_Cr budget; `None` restores
    /// the default of following the peer's STmin.
    pub fn set_n_cs(&mut self, value: Option<Duration>) -> Result<(), TransportError> {
        if let Some(value) = value {
            let max = self.max_delay(self.n_cr_timeout, self.measured_n_as);
            if value > max {
                return Err(TransportError::InvalidTimingValue {
                    parameter: TimingParameter::NCs,
                    reason: format!("{value:?} exceeds the allowed maximum of {max:?}"),
                });
            }
        }
        self.n_cs = value;
        Ok(())
    }

    pub fn record_n_as(&mut self, value: Duration) {
        self.measured_n_as = Some(value);
    }

    pub fn record_n_ar(&mut self, value: Duration) {
        self.measured_n_ar = Some(value);
    }

    fn max_delay(&self, paired_timeout: Duration, measured: Option<Duration>) -> Duration {
        paired_timeout
            .mul_f64(DELAY_TIMEOUT_FRACTION)
            .saturating_sub(measured.unwrap_or(Duration::ZERO))
    }
}

fn check_timeout(parameter: TimingParameter, value: Duration) -> Result<(), TransportError> {
    if value.is_zero() {
        return Err(TransportError::InvalidTimingValue {
            parameter,
            reason: "timeout must be greater than zero".into(),
        });
    }
    if value != DEFAULT_TIMEOUT {
        tracing::warn!(%parameter, ?value, "timeout differs from the ISO default of 1000 ms");
    }
    Ok(())
}
