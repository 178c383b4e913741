use std::collections::HashSet;

use crate::config::HeaderRule;
use crate::transport::HttpResponse;

pub(crate) fn bad_status(status: u16, bad_responses: &HashSet<u16>) -> bool {
    !bad_responses.is_empty() && bad_responses.contains(&status)
}

pub(crate) fn bad_header<'a>(
    rules: &'a [HeaderRule],
    response: &HttpResponse,
) -> Option<&'a HeaderRule> {
    rules.iter().find(|rule| {
        response
            .header(&rule.name)
            .map(|value| value.trim() == rule.value)
            .unwrap_or(false)
    })
}
