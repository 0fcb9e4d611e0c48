//! Line protocol codec.
//!
//! Requests are `CODE [arg…]` lines, whitespace separated, CRLF terminated.
//! Responses are `CODE result` on success or `ER message` on failure.

/// Sentinel code produced for an empty request line; no command is
/// registered under it, so it falls through to `ER Invalid command`.
pub const ERROR_CODE: &str = "ER";

/// Splits a request line into its uppercased code and argument list.
pub fn parse_command(message: &str) -> (String, Vec<String>) {
    let mut parts = message.split_whitespace();
    match parts.next() {
        Some(code) => (code.to_uppercase(), parts.map(str::to_string).collect()),
        None => (ERROR_CODE.to_string(), Vec::new()),
    }
}

/// Reassembles a command line from a code and its arguments.
pub fn format_command(code: &str, args: &[String]) -> String {
    if args.is_empty() {
        code.to_string()
    } else {
        format!("{} {}", code, args.join(" "))
    }
}

/// Splits an `"<account>/<owner>"` address, trimming both sides.
/// Any other shape (no slash, more than one slash) yields `None`.
pub fn parse_address(address: &str) -> Option<(String, String)> {
    let parts: Vec<&str> = address.trim().split('/').collect();
    match parts.as_slice() {
        [account, owner] => Some((account.trim().to_string(), owner.trim().to_string())),
        _ => None,
    }
}

/// Decides whether a command addresses this node.
///
/// Commands without an address argument are local by definition, and so is
/// anything whose first argument does not parse as a full `account/owner`
/// address; the local command will produce its own error for bad arguments.
pub fn is_command_for_us(our_code: &str, first_arg: Option<&str>) -> bool {
    let Some(arg) = first_arg else {
        return true;
    };
    match parse_address(arg) {
        Some((account, owner)) if !account.is_empty() && !owner.is_empty() => owner == our_code,
        _ => true,
    }
}
