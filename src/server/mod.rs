pub mod conninfo;
pub mod name;
pub mod postgres;
pub mod record;
pub mod render;


pub use conninfo::{synthesize, ConnFields, ConnSpec, StructuredConn};
pub use name::ServerName;
pub use postgres::PostgresProfile;
pub use record::{Compression, ServerDeclaration, ServerRecord};
pub use render::render;
