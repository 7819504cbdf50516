use crate::marshal::Flatten;
use crate::proto::arg::Arg;
use crate::proto::codec::Encoder;

/// A command ready to be sent to Redis.
///
/// Commands are built with the builder pattern. Arguments keep exactly the
/// order in which they were added; nothing is reordered or deduplicated.
///
/// # Example
///
/// ```
/// use respool::core::command::Cmd;
///
/// let cmd = Cmd::new("HINCRBY").arg("counters").arg("hits").arg(5);
/// assert_eq!(cmd.name(), "HINCRBY");
/// assert_eq!(cmd.arguments().len(), 3);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Cmd {
    name: String,
    args: Vec<Arg>,
}

impl Cmd {
    /// Creates a new command with the given name.
    ///
    /// # Arguments
    ///
    /// * `name` - The command name (e.g., "GET", "SET", "HMSET")
    #[inline]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Appends an argument to the command.
    #[inline]
    pub fn arg<T: Into<Arg>>(mut self, arg: T) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends every item of `args` in iteration order.
    #[inline]
    pub fn args<I, T>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Arg>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Appends the flattened `key, value, ...` form of a map or tagged struct.
    #[inline]
    pub fn arg_flat<F: Flatten + ?Sized>(mut self, value: &F) -> Self {
        value.flatten_into(&mut self.args);
        self
    }

    /// The command verb.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The positional arguments, verb excluded.
    pub fn arguments(&self) -> &[Arg] {
        &self.args
    }

    /// Encodes the command into `encoder`.
    pub fn encode(&self, encoder: &mut Encoder) {
        encoder.encode_command(&self.name, &self.args);
    }
}

/// Creates a PING command.
#[inline]
pub fn ping() -> Cmd {
    Cmd::new("PING")
}

/// Creates an AUTH command with password only.
#[inline]
pub fn auth(password: impl Into<Arg>) -> Cmd {
    Cmd::new("AUTH").arg(password)
}

/// Creates an AUTH command with username and password (ACL style).
#[inline]
pub fn auth_with_username(username: impl Into<Arg>, password: impl Into<Arg>) -> Cmd {
    Cmd::new("AUTH").arg(username).arg(password)
}

/// Creates a SELECT command.
#[inline]
pub fn select(db: i64) -> Cmd {
    Cmd::new("SELECT").arg(db)
}

/// Creates a CLIENT SETNAME command.
#[inline]
pub fn client_setname(name: impl Into<Arg>) -> Cmd {
    Cmd::new("CLIENT").arg("SETNAME").arg(name)
}

/// Creates an HGETALL command.
#[inline]
pub fn hgetall(key: impl Into<Arg>) -> Cmd {
    Cmd::new("HGETALL").arg(key)
}

/// Creates an HMGET command.
#[inline]
pub fn hmget<I, T>(key: impl Into<Arg>, fields: I) -> Cmd
where
    I: IntoIterator<Item = T>,
    T: Into<Arg>,
{
    Cmd::new("HMGET").arg(key).args(fields)
}

/// Creates an HMSET command from a map or tagged struct.
#[inline]
pub fn hmset<F: Flatten + ?Sized>(key: impl Into<Arg>, fields: &F) -> Cmd {
    Cmd::new("HMSET").arg(key).arg_flat(fields)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::proto::codec::encode_command;

    fn wire(cmd: &Cmd) -> Vec<u8> {
        encode_command(cmd.name(), cmd.arguments()).to_vec()
    }

    #[test]
    fn test_set_cmd() {
        let cmd = Cmd::new("SET").arg("k").arg("v");
        assert_eq!(wire(&cmd), b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n");
    }

    #[test]
    fn test_cmd_keeps_argument_order() {
        let cmd = Cmd::new("ZADD").arg("z").arg(1.5).arg("a").arg(1.5).arg("a");
        assert_eq!(
            cmd.arguments(),
            &[
                Arg::from("z"),
                Arg::Float(1.5),
                Arg::from("a"),
                Arg::Float(1.5),
                Arg::from("a"),
            ]
        );
    }

    #[test]
    fn test_auth_cmds() {
        assert_eq!(auth("secret").arguments(), &[Arg::from("secret")]);
        assert_eq!(
            auth_with_username("alice", "secret").arguments(),
            &[Arg::from("alice"), Arg::from("secret")]
        );
    }

    #[test]
    fn test_select_cmd() {
        assert_eq!(wire(&select(3)), b"*2\r\n$6\r\nSELECT\r\n$1\r\n3\r\n");
    }

    #[test]
    fn test_hmget_cmd() {
        let cmd = hmget("key", ["field1", "field2"]);
        assert_eq!(
            wire(&cmd),
            b"*4\r\n$5\r\nHMGET\r\n$3\r\nkey\r\n$6\r\nfield1\r\n$6\r\nfield2\r\n"
        );
    }

    #[test]
    fn test_hmset_cmd_from_map() {
        let mut fields = BTreeMap::new();
        fields.insert("a", "1");
        fields.insert("b", "2");
        let cmd = hmset("key", &fields);
        assert_eq!(
            cmd.arguments(),
            &[
                Arg::from("key"),
                Arg::from("a"),
                Arg::from("1"),
                Arg::from("b"),
                Arg::from("2"),
            ]
        );
    }
}
