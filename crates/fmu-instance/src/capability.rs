use core::fmt;

/// Optional features a model may declare.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Capability {
    CoSimulation,
    ModelExchange,
    GetAndSetFmuState,
    SerializeFmuState,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Capability::CoSimulation => "CoSimulation",
            Capability::ModelExchange => "ModelExchange",
            Capability::GetAndSetFmuState => "canGetAndSetFMUstate",
            Capability::SerializeFmuState => "canSerializeFMUstate",
        };
        f.write_str(s)
    }
}
