//! Instrument universe loader.

use crate::domain::error::RebalancerError;
use crate::domain::instrument::Instrument;
use crate::domain::universe::UniverseCriteria;

pub trait InstrumentPort: Send + Sync {
    fn load_instruments(
        &self,
        criteria: &UniverseCriteria,
    ) -> Result<Vec<Instrument>, RebalancerError>;
}
